use chrono::Duration;
use std::sync::Arc;

use crate::domain::entities::{Appointment, AppointmentStatus};
use crate::domain::ports::agent_repository::AgentRepository;
use crate::domain::ports::channel_adapter::{
    ChannelAdapter, DeliveryReceipt, MessagePayload, OutboundMessage,
};
use crate::domain::ports::time_service::TimeService;
use crate::domain::services::{ContentResolver, TemplateVariables};
use crate::infrastructure::http::middleware::error::{ApiError, ApiResult};

/// What a manual test send produced
#[derive(Debug, Clone)]
pub struct TestSendResult {
    pub payload: MessagePayload,
    pub receipt: DeliveryReceipt,
}

/// Sends one reminder rule immediately to an arbitrary destination.
///
/// Nothing is persisted and no policy applies; the appointment variables are filled
/// from a sample appointment one hour out.
#[derive(Clone)]
pub struct ReminderTestService {
    agents: Arc<dyn AgentRepository>,
    resolver: ContentResolver,
    channel: Arc<dyn ChannelAdapter>,
    time: Arc<dyn TimeService>,
}

impl ReminderTestService {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        resolver: ContentResolver,
        channel: Arc<dyn ChannelAdapter>,
        time: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            agents,
            resolver,
            channel,
            time,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn trigger(
        &self,
        agent_id: i64,
        rule_index: usize,
        destination: &str,
    ) -> ApiResult<TestSendResult> {
        if destination.trim().is_empty() {
            return Err(ApiError::BadRequest("destination is required".to_string()));
        }

        let agent = self
            .agents
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Agent {} not found", agent_id)))?;
        let rule = agent.reminders.rules.get(rule_index).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Agent {} has no reminder rule {} ({} configured)",
                agent_id,
                rule_index,
                agent.reminders.rules.len()
            ))
        })?;

        let sample = Appointment {
            id: 0,
            agent_id,
            conversation_id: None,
            customer_name: "Test Customer".to_string(),
            customer_phone: destination.to_string(),
            title: "Test appointment".to_string(),
            start_time: self.time.now() + Duration::hours(1),
            duration_minutes: 30,
            status: AppointmentStatus::Scheduled,
        };
        let vars = TemplateVariables::for_appointment(&agent, &sample);

        let content = self
            .resolver
            .resolve_reminder(&agent, &rule.content, &vars, Vec::new())
            .await
            .map_err(|e| {
                ApiError::BadRequest(format!("Could not resolve reminder content: {}", e))
            })?;

        let message = OutboundMessage {
            agent_id,
            channel: agent.channel,
            to: destination.to_string(),
            payload: content.payload,
            idempotency_key: format!("test:{}", uuid::Uuid::new_v4()),
        };
        let receipt = self
            .channel
            .send(&message)
            .await
            .map_err(|e| ApiError::Internal(format!("Test send failed: {}", e)))?;

        tracing::info!(
            "Test reminder {} for agent {} sent to {}",
            rule_index,
            agent_id,
            destination
        );
        Ok(TestSendResult {
            payload: message.payload,
            receipt,
        })
    }
}
