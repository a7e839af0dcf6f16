use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::domain::entities::{Appointment, ConversationMessage};
use crate::infrastructure::http::middleware::error::ApiResult;

/// Events that feed the trigger detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemEvent {
    AppointmentCreated {
        appointment: Appointment,
    },
    AppointmentRescheduled {
        appointment: Appointment,
    },
    AppointmentCancelled {
        appointment_id: i64,
    },
    MessageReceived {
        agent_id: i64,
        customer_name: String,
        customer_phone: String,
        message: ConversationMessage,
    },
    ConversationDeleted {
        conversation_id: i64,
    },
    AgentConfigUpdated {
        agent_id: i64,
    },
}

impl SystemEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SystemEvent::AppointmentCreated { .. } => "appointment_created",
            SystemEvent::AppointmentRescheduled { .. } => "appointment_rescheduled",
            SystemEvent::AppointmentCancelled { .. } => "appointment_cancelled",
            SystemEvent::MessageReceived { .. } => "message_received",
            SystemEvent::ConversationDeleted { .. } => "conversation_deleted",
            SystemEvent::AgentConfigUpdated { .. } => "agent_config_updated",
        }
    }
}

/// Event bus trait for publishing and subscribing to system events
#[async_trait]
pub trait EventBus: Send + Sync {
    fn publish(&self, event: SystemEvent) -> ApiResult<()>;

    fn subscribe(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<SystemEvent, BroadcastStreamRecvError>> + Send>>;
}

/// In-process broadcast bus
#[derive(Clone)]
pub struct LocalEventBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl LocalEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    fn publish(&self, event: SystemEvent) -> ApiResult<()> {
        // Nobody listening is not an error for the publisher
        if let Err(e) = self.tx.send(event) {
            tracing::debug!("No active subscribers for event: {}", e.0.name());
        }
        Ok(())
    }

    fn subscribe(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<SystemEvent, BroadcastStreamRecvError>> + Send>> {
        let rx = self.tx.subscribe();
        Box::pin(BroadcastStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = LocalEventBus::new(8);
        let mut stream = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(SystemEvent::ConversationDeleted { conversation_id: 7 })
            .unwrap();

        match stream.next().await {
            Some(Ok(SystemEvent::ConversationDeleted { conversation_id })) => {
                assert_eq!(conversation_id, 7)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = LocalEventBus::new(8);
        assert!(bus
            .publish(SystemEvent::AgentConfigUpdated { agent_id: 1 })
            .is_ok());
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event: SystemEvent =
            serde_json::from_str(r#"{"type":"appointment_cancelled","appointment_id":42}"#)
                .unwrap();
        assert!(matches!(
            event,
            SystemEvent::AppointmentCancelled { appointment_id: 42 }
        ));
    }
}
