use async_trait::async_trait;
use autoreach::domain::errors::{DeliveryError, GenerationError};
use autoreach::domain::ports::channel_adapter::{ChannelAdapter, DeliveryReceipt, OutboundMessage};
use autoreach::domain::ports::text_generator::{GenerationRequest, TextGenerator};
use autoreach::domain::ports::time_service::TimeService;
use autoreach::domain::ports::webhook_sender::WebhookSender;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Clock that only moves when told to
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

#[async_trait]
impl TimeService for ManualClock {
    async fn sleep(&self, _duration: std::time::Duration) {
        tokio::task::yield_now().await;
    }

    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// A send captured by the recording channel, with the clock reading at send time
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: OutboundMessage,
    pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RecordingChannelAdapter {
    clock: ManualClock,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    fail_to: Arc<Mutex<Vec<String>>>,
    held: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
}

impl RecordingChannelAdapter {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_to: Arc::new(Mutex::new(Vec::new())),
            held: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sends to this destination block until the returned gate is notified
    pub fn hold_destination(&self, destination: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.held
            .lock()
            .unwrap()
            .insert(destination.to_string(), gate.clone());
        gate
    }

    /// Every send to this destination fails
    pub fn fail_destination(&self, destination: &str) {
        self.fail_to.lock().unwrap().push(destination.to_string());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, destination: &str) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|s| s.message.to == destination)
            .collect()
    }
}

#[async_trait]
impl ChannelAdapter for RecordingChannelAdapter {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, String> {
        let gate = self.held.lock().unwrap().get(&message.to).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_to.lock().unwrap().contains(&message.to) {
            return Err(format!("gateway rejected {}", message.to));
        }
        self.sent.lock().unwrap().push(SentMessage {
            message: message.clone(),
            at: self.clock.now(),
        });
        Ok(DeliveryReceipt {
            provider_message_id: Some(format!("rec-{}", message.idempotency_key)),
        })
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Replies from a script, then falls back to a fixed reply
#[derive(Clone)]
pub struct ScriptedTextGenerator {
    script: Arc<Mutex<VecDeque<Result<String, GenerationError>>>>,
    fallback: String,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl ScriptedTextGenerator {
    pub fn new(fallback: &str) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: fallback.to_string(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, reply: Result<String, GenerationError>) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedTextGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Answers webhook posts with scripted HTTP statuses, 200 once the script runs out
#[derive(Clone)]
pub struct ScriptedWebhookSender {
    clock: ManualClock,
    statuses: Arc<Mutex<VecDeque<u16>>>,
    attempts: Arc<Mutex<Vec<(DateTime<Utc>, String, Option<String>)>>>,
}

impl ScriptedWebhookSender {
    pub fn new(clock: ManualClock, statuses: &[u16]) -> Self {
        Self {
            clock,
            statuses: Arc::new(Mutex::new(statuses.iter().copied().collect())),
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// (time, body, signature) of every post
    pub fn attempts(&self) -> Vec<(DateTime<Utc>, String, Option<String>)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSender for ScriptedWebhookSender {
    async fn deliver(&self, _url: &str, body: &str, signature: Option<&str>) -> Result<u16, DeliveryError> {
        self.attempts.lock().unwrap().push((
            self.clock.now(),
            body.to_string(),
            signature.map(str::to_string),
        ));
        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(200);
        if (200..300).contains(&status) {
            Ok(status)
        } else {
            Err(DeliveryError::from_status(status, format!("HTTP {}", status)))
        }
    }
}
