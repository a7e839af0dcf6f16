use autoreach::bootstrap::{build_engine, Adapters, Engine, EngineSettings};
use autoreach::domain::entities::{
    Agent, Appointment, AppointmentStatus, Channel, ConversationMessage, MessageAuthor,
};
use autoreach::domain::ports::agent_repository::AgentRepository;
use autoreach::domain::ports::webhook_sender::WebhookSender;
use autoreach::infrastructure::persistence::Database;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use super::fakes::{ManualClock, RecordingChannelAdapter, ScriptedTextGenerator, ScriptedWebhookSender};
use super::test_db::setup_test_db;

pub const AGENT_ID: i64 = 1;
pub const CUSTOMER_PHONE: &str = "+5511999990000";
pub const BUSINESS_PHONE: &str = "+5511333330000";

/// An engine wired to a fresh database and in-process fakes
pub struct Harness {
    pub db: Database,
    pub clock: ManualClock,
    pub channel: RecordingChannelAdapter,
    pub generator: ScriptedTextGenerator,
    pub webhooks: ScriptedWebhookSender,
    pub engine: Engine,
}

pub async fn harness_at(start: DateTime<Utc>) -> Harness {
    let clock = ManualClock::new(start);
    let webhooks = ScriptedWebhookSender::new(clock.clone(), &[]);
    harness_with(clock, webhooks.clone(), Arc::new(webhooks), None).await
}

/// Harness whose summary webhooks go through `sender` instead of the scripted fake
pub async fn harness_with_sender(
    start: DateTime<Utc>,
    sender: Arc<dyn WebhookSender>,
    signing_secret: Option<&str>,
) -> Harness {
    let clock = ManualClock::new(start);
    let scripted = ScriptedWebhookSender::new(clock.clone(), &[]);
    harness_with(clock, scripted, sender, signing_secret).await
}

pub async fn harness_with_statuses(start: DateTime<Utc>, statuses: &[u16]) -> Harness {
    let clock = ManualClock::new(start);
    let webhooks = ScriptedWebhookSender::new(clock.clone(), statuses);
    harness_with(clock, webhooks.clone(), Arc::new(webhooks), None).await
}

async fn harness_with(
    clock: ManualClock,
    webhooks: ScriptedWebhookSender,
    sender: Arc<dyn WebhookSender>,
    signing_secret: Option<&str>,
) -> Harness {
    let db = setup_test_db().await;
    let channel = RecordingChannelAdapter::new(clock.clone());
    let generator = ScriptedTextGenerator::new("Just checking in, are you still interested?");

    let adapters = Adapters {
        channel: Arc::new(channel.clone()),
        generator: Arc::new(generator.clone()),
        webhooks: sender,
        time: Arc::new(clock.clone()),
    };
    let mut settings = EngineSettings::default();
    settings.dispatch.instance_id = "test".to_string();
    settings.dispatch.signing_secret = signing_secret.map(str::to_string);

    let engine = build_engine(&db, adapters, settings);

    Harness {
        db,
        clock,
        channel,
        generator,
        webhooks,
        engine,
    }
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn test_agent(channel: Channel) -> Agent {
    let mut agent = Agent::new(AGENT_ID, "Clinic Bot".to_string(), "UTC".to_string(), channel);
    agent.business_name = Some("Sunrise Clinic".to_string());
    agent
}

pub async fn save_agent(db: &Database, agent: &Agent) {
    db.upsert_agent(agent).await.expect("Failed to save agent");
}

pub fn appointment(id: i64, conversation_id: Option<i64>, start_time: DateTime<Utc>) -> Appointment {
    Appointment {
        id,
        agent_id: AGENT_ID,
        conversation_id,
        customer_name: "Ana".to_string(),
        customer_phone: CUSTOMER_PHONE.to_string(),
        title: "Cleaning".to_string(),
        start_time,
        duration_minutes: 45,
        status: AppointmentStatus::Scheduled,
    }
}

pub fn message(
    id: i64,
    conversation_id: i64,
    author: MessageAuthor,
    content: &str,
    created_at: DateTime<Utc>,
) -> ConversationMessage {
    ConversationMessage {
        id,
        conversation_id,
        author,
        content: content.to_string(),
        created_at,
    }
}

/// Record a message through the trigger detector, as the event listener would
pub async fn deliver_message(harness: &Harness, msg: ConversationMessage) {
    harness
        .engine
        .detector
        .on_message(AGENT_ID, "Ana", CUSTOMER_PHONE, &msg)
        .await
        .expect("Failed to handle message");
}
