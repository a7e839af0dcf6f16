use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Agent, Conversation, JobStatus};

/// Summary hand-off for one idle episode of a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryJob {
    pub id: String,
    pub agent_id: i64,
    pub conversation_id: i64,
    /// Last customer message of the episode being summarized
    pub episode_anchor: DateTime<Utc>,
    pub summary_text: Option<String>,
    pub message_count: i64,
    pub webhook_status: JobStatus,
    pub status_reason: Option<String>,
    pub webhook_attempts: i64,
    pub webhook_last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SummaryJob {
    pub fn new(conversation: &Conversation, episode_anchor: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: conversation.agent_id,
            conversation_id: conversation.id,
            episode_anchor,
            summary_text: None,
            message_count: conversation.message_count,
            webhook_status: JobStatus::Pending,
            status_reason: None,
            webhook_attempts: 0,
            webhook_last_error: None,
            next_retry_at: None,
            sent_at: None,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Body POSTed to the configured summary webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryWebhookPayload {
    pub event: String,
    pub timestamp: String,
    pub agent_id: i64,
    pub agent_name: String,
    pub conversation_id: i64,
    pub customer_name: String,
    pub customer_phone: String,
    pub message_count: i64,
    pub summary: String,
}

impl SummaryWebhookPayload {
    pub const EVENT: &'static str = "conversation_summary";

    pub fn new(
        agent: &Agent,
        conversation: &Conversation,
        job: &SummaryJob,
        summary: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event: Self::EVENT.to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            agent_id: agent.id,
            agent_name: agent.name.clone(),
            conversation_id: conversation.id,
            customer_name: conversation.customer_name.clone(),
            customer_phone: conversation.customer_phone.clone(),
            message_count: job.message_count,
            summary,
        }
    }
}
