use crate::{
    domain::entities::{Agent, Channel, FollowupConfig, ReminderSettings, SummaryConfig},
    infrastructure::http::middleware::{ApiError, ApiResult, AppState},
};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use chrono_tz::Tz;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct UpsertAgentRequest {
    pub name: String,
    pub business_name: Option<String>,
    pub persona: Option<String>,
    pub timezone: String,
    pub channel: Channel,
    #[serde(default)]
    pub reminders: ReminderSettings,
    #[serde(default)]
    pub followup: FollowupConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Agent>> {
    state
        .agent_repo
        .get_agent(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Agent {} not found", id)))
}

/// Replace an agent's configuration. Pending jobs of disabled features are cancelled
/// before the response.
pub async fn upsert_agent(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpsertAgentRequest>,
) -> ApiResult<Json<Agent>> {
    if request.timezone.parse::<Tz>().is_err() {
        return Err(ApiError::BadRequest(format!(
            "Unknown timezone '{}'",
            request.timezone
        )));
    }
    if request.followup.enabled && request.followup.sequence.is_empty() {
        return Err(ApiError::BadRequest(
            "Follow-up config needs at least one step".to_string(),
        ));
    }

    let created_at = state
        .agent_repo
        .get_agent(id)
        .await?
        .map(|existing| existing.created_at)
        .unwrap_or_else(Utc::now);

    let mut agent = Agent::new(id, request.name, request.timezone, request.channel);
    agent.business_name = request.business_name;
    agent.persona = request.persona;
    agent.reminders = request.reminders;
    agent.followup = request.followup;
    agent.summary = request.summary;
    agent.created_at = created_at;

    state.agent_repo.upsert_agent(&agent).await?;
    state.detector.on_agent_config_updated(id).await?;

    tracing::info!("Agent {} configuration updated", id);
    Ok(Json(agent))
}
