use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{JobStatus, SentVia};

/// One step of a re-engagement sequence for a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowupJob {
    pub id: String,
    pub agent_id: i64,
    pub conversation_id: i64,
    /// 1-based position in the configured sequence
    pub followup_number: i64,
    /// Last customer message at the time the sequence started; identifies the episode
    pub episode_anchor: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
    pub status: JobStatus,
    pub status_reason: Option<String>,
    pub sent_via: Option<SentVia>,
    pub content: Option<String>,
    pub template_name: Option<String>,
    pub ai_reason: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FollowupJob {
    pub fn new(
        agent_id: i64,
        conversation_id: i64,
        followup_number: i64,
        episode_anchor: DateTime<Utc>,
        scheduled_for: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id,
            conversation_id,
            followup_number,
            episode_anchor,
            scheduled_for,
            status: JobStatus::Pending,
            status_reason: None,
            sent_via: None,
            content: None,
            template_name: None,
            ai_reason: None,
            error_message: None,
            sent_at: None,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }
}
