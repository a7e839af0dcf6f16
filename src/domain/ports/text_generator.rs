use async_trait::async_trait;

use crate::domain::entities::ConversationMessage;
use crate::domain::errors::GenerationError;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub agent_id: i64,
    pub system_prompt: String,
    pub instruction: String,
    /// Recent conversation history, oldest first
    pub history: Vec<ConversationMessage>,
}

/// Black-box AI text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}
