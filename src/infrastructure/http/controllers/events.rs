use crate::{
    application::listeners::handle_event,
    domain::entities::{Appointment, ConversationMessage},
    infrastructure::http::middleware::{ApiError, ApiResult, AppState},
    shared::events::SystemEvent,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MessageEventRequest {
    pub agent_id: i64,
    #[serde(default)]
    pub customer_name: String,
    pub customer_phone: String,
    pub message: ConversationMessage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppointmentEventRequest {
    Created { appointment: Appointment },
    Rescheduled { appointment: Appointment },
    Cancelled { appointment_id: i64 },
}

impl From<AppointmentEventRequest> for SystemEvent {
    fn from(request: AppointmentEventRequest) -> Self {
        match request {
            AppointmentEventRequest::Created { appointment } => {
                SystemEvent::AppointmentCreated { appointment }
            }
            AppointmentEventRequest::Rescheduled { appointment } => {
                SystemEvent::AppointmentRescheduled { appointment }
            }
            AppointmentEventRequest::Cancelled { appointment_id } => {
                SystemEvent::AppointmentCancelled { appointment_id }
            }
        }
    }
}

/// Jobs derived from the event are stored before the response; delivery happens later
pub async fn ingest_message(
    State(state): State<AppState>,
    Json(request): Json<MessageEventRequest>,
) -> ApiResult<StatusCode> {
    if request.customer_phone.trim().is_empty() {
        return Err(ApiError::BadRequest("customer_phone is required".to_string()));
    }

    let event = SystemEvent::MessageReceived {
        agent_id: request.agent_id,
        customer_name: request.customer_name,
        customer_phone: request.customer_phone,
        message: request.message,
    };
    handle_event(&state.detector, event).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn ingest_appointment(
    State(state): State<AppState>,
    Json(request): Json<AppointmentEventRequest>,
) -> ApiResult<StatusCode> {
    handle_event(&state.detector, request.into()).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn ingest_conversation_deleted(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> ApiResult<StatusCode> {
    handle_event(
        &state.detector,
        SystemEvent::ConversationDeleted { conversation_id },
    )
    .await?;
    Ok(StatusCode::ACCEPTED)
}
