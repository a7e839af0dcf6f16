use crate::{
    domain::ports::channel_adapter::MessagePayload,
    infrastructure::http::middleware::{ApiResult, AppState},
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct TestReminderRequest {
    pub rule_index: usize,
    pub destination: String,
}

#[derive(Debug, Serialize)]
pub struct TestReminderResponse {
    pub payload: MessagePayload,
    pub provider_message_id: Option<String>,
}

pub async fn trigger_test_reminder(
    State(state): State<AppState>,
    Path(agent_id): Path<i64>,
    Json(request): Json<TestReminderRequest>,
) -> ApiResult<Json<TestReminderResponse>> {
    let result = state
        .reminder_test_service
        .trigger(agent_id, request.rule_index, &request.destination)
        .await?;

    Ok(Json(TestReminderResponse {
        payload: result.payload,
        provider_message_id: result.receipt.provider_message_id,
    }))
}
