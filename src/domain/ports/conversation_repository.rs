use chrono::{DateTime, Utc};

use crate::domain::entities::{Conversation, ConversationMessage};
use crate::infrastructure::http::middleware::error::ApiResult;

#[async_trait::async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn get_conversation(&self, id: i64) -> ApiResult<Option<Conversation>>;

    /// Create the conversation if unknown, refreshing customer details otherwise
    async fn upsert_conversation(
        &self,
        id: i64,
        agent_id: i64,
        customer_name: &str,
        customer_phone: &str,
    ) -> ApiResult<()>;

    /// Store a message and move the conversation's counters and watermarks.
    /// Returns false when the message id was already recorded.
    async fn record_message(&self, message: &ConversationMessage) -> ApiResult<bool>;

    /// Most recent messages, oldest first
    async fn recent_messages(
        &self,
        conversation_id: i64,
        limit: i64,
    ) -> ApiResult<Vec<ConversationMessage>>;

    /// Conversations of an agent idle since `idle_before` whose current episode has
    /// no summary job yet
    async fn find_summary_candidates(
        &self,
        agent_id: i64,
        idle_before: DateTime<Utc>,
        min_messages: i64,
    ) -> ApiResult<Vec<Conversation>>;

    async fn delete_conversation(&self, id: i64) -> ApiResult<()>;
}
