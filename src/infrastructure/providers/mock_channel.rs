use async_trait::async_trait;

use crate::domain::ports::channel_adapter::{ChannelAdapter, DeliveryReceipt, OutboundMessage};

/// Channel adapter that only logs; used when no gateway is configured
pub struct MockChannelAdapter {
    /// If true, simulate delivery failures
    pub should_fail: bool,
}

impl MockChannelAdapter {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

impl Default for MockChannelAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for MockChannelAdapter {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, String> {
        if self.should_fail {
            return Err(format!(
                "Mock delivery failure for {}",
                message.idempotency_key
            ));
        }

        tracing::debug!(
            "Mock delivery of {} to {} over {}: {}",
            message.idempotency_key,
            message.to,
            message.channel,
            message.payload.preview()
        );
        Ok(DeliveryReceipt {
            provider_message_id: Some(format!("mock-{}", message.idempotency_key)),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
