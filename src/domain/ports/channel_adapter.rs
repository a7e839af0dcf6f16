use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::entities::Channel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    Text {
        body: String,
    },
    Template {
        name: String,
        language: String,
        parameters: Vec<String>,
        /// Template body with parameters filled in, for records and logs
        preview: String,
    },
}

impl MessagePayload {
    pub fn preview(&self) -> &str {
        match self {
            MessagePayload::Text { body } => body,
            MessagePayload::Template { preview, .. } => preview,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub agent_id: i64,
    pub channel: Channel,
    pub to: String,
    pub payload: MessagePayload,
    /// Stable per job, so adapters can drop redelivered sends
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub provider_message_id: Option<String>,
}

/// Physically delivers a message over a chat channel
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, String>;

    fn name(&self) -> &str;
}
