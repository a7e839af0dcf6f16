use chrono::Duration;
use std::sync::Arc;

use crate::application::services::JobStateMachine;
use crate::domain::entities::{
    Agent, Appointment, AppointmentStatus, Conversation, ConversationMessage, FollowupJob,
    MessageAuthor, Recipient, ReminderJob, SummaryJob,
};
use crate::domain::ports::agent_repository::AgentRepository;
use crate::domain::ports::appointment_repository::AppointmentRepository;
use crate::domain::ports::conversation_repository::ConversationRepository;
use crate::domain::ports::time_service::TimeService;
use crate::infrastructure::http::middleware::error::ApiResult;

/// The only component that creates jobs.
///
/// Every handler is safe to run twice for the same event: duplicate jobs are
/// rejected by the storage uniqueness constraints.
#[derive(Clone)]
pub struct TriggerDetector {
    agents: Arc<dyn AgentRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    conversations: Arc<dyn ConversationRepository>,
    jobs: JobStateMachine,
    time: Arc<dyn TimeService>,
}

impl TriggerDetector {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        conversations: Arc<dyn ConversationRepository>,
        jobs: JobStateMachine,
        time: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            agents,
            appointments,
            conversations,
            jobs,
            time,
        }
    }

    /// Returns the number of reminder jobs created
    #[tracing::instrument(skip(self, appointment), fields(appointment_id = appointment.id))]
    pub async fn on_appointment_created(&self, appointment: &Appointment) -> ApiResult<usize> {
        self.appointments.upsert_appointment(appointment).await?;
        self.schedule_reminders(appointment).await
    }

    #[tracing::instrument(skip(self, appointment), fields(appointment_id = appointment.id))]
    pub async fn on_appointment_rescheduled(&self, appointment: &Appointment) -> ApiResult<usize> {
        self.appointments.upsert_appointment(appointment).await?;
        let cancelled = self
            .jobs
            .cancel_reminders_for_appointment(appointment.id, "appointment rescheduled")
            .await?;
        if cancelled > 0 {
            tracing::info!(
                "Cancelled {} reminder jobs of rescheduled appointment {}",
                cancelled,
                appointment.id
            );
        }
        self.schedule_reminders(appointment).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn on_appointment_cancelled(&self, appointment_id: i64) -> ApiResult<u64> {
        if let Some(mut appointment) = self.appointments.get_appointment(appointment_id).await? {
            appointment.status = AppointmentStatus::Cancelled;
            self.appointments.upsert_appointment(&appointment).await?;
        }

        let cancelled = self
            .jobs
            .cancel_reminders_for_appointment(appointment_id, "appointment cancelled")
            .await?;
        tracing::info!(
            "Appointment {} cancelled, {} pending reminders cancelled",
            appointment_id,
            cancelled
        );
        Ok(cancelled)
    }

    /// Record an inbound or outbound message and re-arm the conversation's timers.
    /// A customer message resets the follow-up sequence.
    #[tracing::instrument(
        skip(self, message, customer_name, customer_phone),
        fields(conversation_id = message.conversation_id)
    )]
    pub async fn on_message(
        &self,
        agent_id: i64,
        customer_name: &str,
        customer_phone: &str,
        message: &ConversationMessage,
    ) -> ApiResult<()> {
        let Some(agent) = self.agents.get_agent(agent_id).await? else {
            tracing::warn!(
                "Ignoring message {} for unknown agent {}",
                message.id,
                agent_id
            );
            return Ok(());
        };

        self.conversations
            .upsert_conversation(message.conversation_id, agent_id, customer_name, customer_phone)
            .await?;

        if !self.conversations.record_message(message).await? {
            tracing::debug!("Message {} already recorded", message.id);
            return Ok(());
        }

        if message.author == MessageAuthor::Customer {
            let cancelled = self
                .jobs
                .cancel_followups_for_conversation(message.conversation_id, "customer replied")
                .await?;
            if cancelled > 0 {
                tracing::info!(
                    "Customer replied in conversation {}, cancelled {} follow-ups",
                    message.conversation_id,
                    cancelled
                );
            }
        }

        if let Some(conversation) = self
            .conversations
            .get_conversation(message.conversation_id)
            .await?
        {
            self.schedule_first_followup(&agent, &conversation).await?;
        }
        Ok(())
    }

    /// Create summary jobs for conversations that went idle. Returns the number created.
    pub async fn scan_inactivity(&self) -> ApiResult<usize> {
        let now = self.time.now();
        let mut created = 0;

        for agent in self.agents.list_agents().await? {
            let config = &agent.summary;
            if !config.enabled {
                continue;
            }

            let idle_before = now - Duration::minutes(config.delay_minutes.max(0));
            let candidates = self
                .conversations
                .find_summary_candidates(agent.id, idle_before, config.min_messages)
                .await?;

            for conversation in candidates {
                let Some(anchor) = conversation.last_customer_message_at else {
                    continue;
                };
                let job = SummaryJob::new(&conversation, anchor);
                if self.jobs.create_summary(&job).await? {
                    tracing::info!(
                        "Conversation {} idle since {:?}, summary job {} created",
                        conversation.id,
                        conversation.last_message_at,
                        job.id
                    );
                    created += 1;
                }
            }
        }

        Ok(created)
    }

    /// Disabled features lose their pending jobs
    #[tracing::instrument(skip(self))]
    pub async fn on_agent_config_updated(&self, agent_id: i64) -> ApiResult<()> {
        let Some(agent) = self.agents.get_agent(agent_id).await? else {
            return Ok(());
        };

        if !agent.reminders.enabled {
            let cancelled = self
                .jobs
                .cancel_reminders_for_agent(agent_id, "config disabled")
                .await?;
            tracing::info!("Reminders disabled for agent {}, cancelled {}", agent_id, cancelled);
        }
        if !agent.followup.enabled {
            let cancelled = self
                .jobs
                .cancel_followups_for_agent(agent_id, "config disabled")
                .await?;
            tracing::info!("Follow-ups disabled for agent {}, cancelled {}", agent_id, cancelled);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn on_conversation_deleted(&self, conversation_id: i64) -> ApiResult<()> {
        self.jobs
            .cancel_followups_for_conversation(conversation_id, "conversation deleted")
            .await?;
        self.jobs
            .cancel_summaries_for_conversation(conversation_id, "conversation deleted")
            .await?;
        self.conversations.delete_conversation(conversation_id).await?;
        Ok(())
    }

    async fn schedule_reminders(&self, appointment: &Appointment) -> ApiResult<usize> {
        let Some(agent) = self.agents.get_agent(appointment.agent_id).await? else {
            tracing::warn!(
                "Appointment {} belongs to unknown agent {}",
                appointment.id,
                appointment.agent_id
            );
            return Ok(0);
        };

        let settings = &agent.reminders;
        if !settings.enabled || appointment.status == AppointmentStatus::Cancelled {
            return Ok(0);
        }

        // Reminders for an appointment that already started are pointless
        if self.time.now() >= appointment.start_time {
            return Ok(0);
        }

        let mut created = 0;
        for (index, rule) in settings.rules.iter().enumerate() {
            for (recipient, destination) in recipients(&agent, appointment) {
                let job = ReminderJob::new(
                    appointment,
                    index as i64,
                    rule.clone(),
                    recipient,
                    destination,
                );
                if self.jobs.create_reminder(&job).await? {
                    created += 1;
                }
            }
        }

        tracing::info!(
            "Scheduled {} reminder jobs for appointment {}",
            created,
            appointment.id
        );
        Ok(created)
    }

    async fn schedule_first_followup(
        &self,
        agent: &Agent,
        conversation: &Conversation,
    ) -> ApiResult<()> {
        let config = &agent.followup;
        if !config.enabled || conversation.message_count < config.min_messages {
            return Ok(());
        }
        let anchor = conversation.last_customer_message_at;
        let (Some(step), Some(anchor)) = (config.step(1), anchor) else {
            return Ok(());
        };

        let job = FollowupJob::new(agent.id, conversation.id, 1, anchor, anchor + step.delay());
        self.jobs.create_followup(&job).await?;
        Ok(())
    }
}

/// Each enabled recipient gets its own job so their outcomes stay independent
fn recipients(agent: &Agent, appointment: &Appointment) -> Vec<(Recipient, String)> {
    let settings = &agent.reminders;
    let mut recipients = Vec::new();

    if settings.notify_customer && !appointment.customer_phone.trim().is_empty() {
        recipients.push((Recipient::Customer, appointment.customer_phone.clone()));
    }
    if settings.notify_business {
        match settings.business_phone.as_deref().map(str::trim) {
            Some(phone) if !phone.is_empty() => {
                recipients.push((Recipient::Business, phone.to_string()))
            }
            _ => tracing::warn!(
                "Agent {} notifies the business but has no business phone",
                agent.id
            ),
        }
    }
    recipients
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Channel, ReminderSettings};
    use chrono::Utc;

    fn appointment(phone: &str) -> Appointment {
        Appointment {
            id: 1,
            agent_id: 1,
            conversation_id: Some(5),
            customer_name: "Ana".into(),
            customer_phone: phone.into(),
            title: "Consult".into(),
            start_time: Utc::now(),
            duration_minutes: 30,
            status: AppointmentStatus::Scheduled,
        }
    }

    #[test]
    fn test_both_recipients() {
        let mut agent = Agent::new(1, "Bot".into(), "UTC".into(), Channel::Whatsapp);
        agent.reminders = ReminderSettings {
            enabled: true,
            rules: vec![],
            notify_customer: true,
            notify_business: true,
            business_phone: Some("+1555".into()),
        };

        let found = recipients(&agent, &appointment("+5511999"));
        assert_eq!(
            found,
            vec![
                (Recipient::Customer, "+5511999".to_string()),
                (Recipient::Business, "+1555".to_string())
            ]
        );
    }

    #[test]
    fn test_business_without_phone_is_dropped() {
        let mut agent = Agent::new(1, "Bot".into(), "UTC".into(), Channel::Whatsapp);
        agent.reminders.notify_customer = false;
        agent.reminders.notify_business = true;
        agent.reminders.business_phone = None;

        assert!(recipients(&agent, &appointment("+5511999")).is_empty());
    }
}
