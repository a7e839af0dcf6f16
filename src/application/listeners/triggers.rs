use std::sync::Arc;
use tokio_stream::StreamExt;

use crate::application::services::TriggerDetector;
use crate::infrastructure::http::middleware::error::ApiResult;
use crate::shared::events::{EventBus, SystemEvent};

/// Feeds every bus event into the trigger detector until the bus closes
pub async fn run_trigger_listener(event_bus: Arc<dyn EventBus>, detector: TriggerDetector) {
    tracing::info!("Trigger listener started");

    let mut receiver = event_bus.subscribe();

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(event) => {
                let name = event.name();
                if let Err(e) = handle_event(&detector, event).await {
                    tracing::error!("Trigger listener failed to handle {}: {}", name, e);
                }
            }
            Err(e) => {
                // Only in-process publishers use the bus. HTTP ingestion calls the
                // detector directly.
                tracing::warn!("Trigger listener lagged: {}", e);
            }
        }
    }

    tracing::info!("Trigger listener stopped");
}

pub async fn handle_event(detector: &TriggerDetector, event: SystemEvent) -> ApiResult<()> {
    tracing::debug!("Trigger listener received {}", event.name());

    match event {
        SystemEvent::AppointmentCreated { appointment } => {
            let created = detector.on_appointment_created(&appointment).await?;
            tracing::info!(
                "Appointment {} created, {} reminder jobs scheduled",
                appointment.id,
                created
            );
        }
        SystemEvent::AppointmentRescheduled { appointment } => {
            let created = detector.on_appointment_rescheduled(&appointment).await?;
            tracing::info!(
                "Appointment {} rescheduled to {}, {} reminder jobs scheduled",
                appointment.id,
                appointment.start_time,
                created
            );
        }
        SystemEvent::AppointmentCancelled { appointment_id } => {
            let cancelled = detector.on_appointment_cancelled(appointment_id).await?;
            tracing::info!(
                "Appointment {} cancelled, {} reminder jobs cancelled",
                appointment_id,
                cancelled
            );
        }
        SystemEvent::MessageReceived {
            agent_id,
            customer_name,
            customer_phone,
            message,
        } => {
            detector
                .on_message(agent_id, &customer_name, &customer_phone, &message)
                .await?;
        }
        SystemEvent::ConversationDeleted { conversation_id } => {
            detector.on_conversation_deleted(conversation_id).await?;
        }
        SystemEvent::AgentConfigUpdated { agent_id } => {
            detector.on_agent_config_updated(agent_id).await?;
        }
    }

    Ok(())
}
