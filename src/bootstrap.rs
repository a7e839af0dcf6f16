use std::sync::Arc;
use std::time::Duration;

use crate::application::services::*;
use crate::config::Config;
use crate::domain::ports::agent_repository::AgentRepository;
use crate::domain::ports::appointment_repository::AppointmentRepository;
use crate::domain::ports::channel_adapter::ChannelAdapter;
use crate::domain::ports::conversation_repository::ConversationRepository;
use crate::domain::ports::distributed_lock::DistributedLock;
use crate::domain::ports::followup_repository::FollowupRepository;
use crate::domain::ports::job_store::JobStore;
use crate::domain::ports::reminder_repository::ReminderRepository;
use crate::domain::ports::send_counter_repository::SendCounterRepository;
use crate::domain::ports::summary_repository::SummaryRepository;
use crate::domain::ports::task_spawner::TaskSpawner;
use crate::domain::ports::template_catalog::TemplateCatalog;
use crate::domain::ports::text_generator::TextGenerator;
use crate::domain::ports::time_service::TimeService;
use crate::domain::ports::webhook_sender::WebhookSender;
use crate::domain::services::ContentResolver;
use crate::infrastructure::http::middleware::AppState;
use crate::infrastructure::persistence::{Database, DatabaseDistributedLock};
use crate::infrastructure::providers::{
    HttpChannelAdapter, MockChannelAdapter, OpenAiTextGenerator, ReqwestWebhookSender,
};
use crate::infrastructure::runtime::{TokioTaskSpawner, TokioTimeService};
use crate::infrastructure::workers::{SchedulerSettings, SchedulerWorker};
use crate::shared::events::{EventBus, LocalEventBus};

/// Outbound collaborators; tests swap these for fakes
#[derive(Clone)]
pub struct Adapters {
    pub channel: Arc<dyn ChannelAdapter>,
    pub generator: Arc<dyn TextGenerator>,
    pub webhooks: Arc<dyn WebhookSender>,
    pub time: Arc<dyn TimeService>,
}

impl Adapters {
    pub fn from_config(config: &Config) -> Self {
        let channel: Arc<dyn ChannelAdapter> = match &config.channel_gateway_url {
            Some(url) => {
                tracing::info!("Channel gateway at {}", url);
                Arc::new(HttpChannelAdapter::new(
                    url.clone(),
                    config.channel_gateway_token.clone(),
                    config.webhook_timeout(),
                ))
            }
            None => {
                tracing::warn!("CHANNEL_GATEWAY_URL not set, outbound messages are only logged");
                Arc::new(MockChannelAdapter::new())
            }
        };

        if config.ai_api_key.is_none() {
            tracing::warn!("AI_API_KEY not set, AI content will fail to generate");
        }
        let generator = Arc::new(OpenAiTextGenerator::new(
            config.ai_api_base.clone(),
            config.ai_api_key.clone().unwrap_or_default(),
            config.ai_model.clone(),
            config.ai_timeout(),
        ));

        Self {
            channel,
            generator,
            webhooks: Arc::new(ReqwestWebhookSender::new(config.webhook_timeout())),
            time: Arc::new(TokioTimeService::new()),
        }
    }
}

/// Tunables for the scheduling engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub scheduler: SchedulerSettings,
    pub dispatch: DispatchSettings,
    pub ai_timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        let scheduler = SchedulerSettings {
            poll_interval: config.poll_interval(),
            workers: config.scheduler_workers,
            batch_size: config.scheduler_batch_size,
            ..Default::default()
        };
        // A dispatch covers one AI call and one delivery, so the lock outlives both
        let lock_ttl = config.ai_timeout() + config.webhook_timeout() + Duration::from_secs(30);
        let dispatch = DispatchSettings {
            instance_id: config.instance_id.clone(),
            lock_ttl,
            signing_secret: config.webhook_signing_secret.clone(),
            ..Default::default()
        };
        Self {
            scheduler: SchedulerSettings {
                lease: scheduler.lease.max(lock_ttl * 2),
                ..scheduler
            },
            dispatch,
            ai_timeout: config.ai_timeout(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSettings::default(),
            dispatch: DispatchSettings::default(),
            ai_timeout: Duration::from_secs(45),
        }
    }
}

/// The wired scheduling engine
#[derive(Clone)]
pub struct Engine {
    /// In-process event intake for embedders; the trigger listener drains it
    pub event_bus: Arc<dyn EventBus>,
    pub jobs: JobStateMachine,
    pub detector: TriggerDetector,
    pub dispatcher: Dispatcher,
    pub scheduler: Arc<SchedulerWorker>,
    pub job_query_service: JobQueryService,
    pub reminder_test_service: ReminderTestService,
}

pub fn build_engine(db: &Database, adapters: Adapters, settings: EngineSettings) -> Engine {
    let agents: Arc<dyn AgentRepository> = Arc::new(db.clone());
    let appointments: Arc<dyn AppointmentRepository> = Arc::new(db.clone());
    let conversations: Arc<dyn ConversationRepository> = Arc::new(db.clone());
    let reminders: Arc<dyn ReminderRepository> = Arc::new(db.clone());
    let followups: Arc<dyn FollowupRepository> = Arc::new(db.clone());
    let summaries: Arc<dyn SummaryRepository> = Arc::new(db.clone());
    let counters: Arc<dyn SendCounterRepository> = Arc::new(db.clone());
    let store: Arc<dyn JobStore> = Arc::new(db.clone());
    let templates: Arc<dyn TemplateCatalog> = Arc::new(db.clone());
    let lock: Arc<dyn DistributedLock> = Arc::new(DatabaseDistributedLock::new(db.clone()));
    let time = adapters.time.clone();

    let jobs = JobStateMachine::new(
        store,
        reminders.clone(),
        followups.clone(),
        summaries.clone(),
        time.clone(),
    );
    let detector = TriggerDetector::new(
        agents.clone(),
        appointments.clone(),
        conversations.clone(),
        jobs.clone(),
        time.clone(),
    );
    let resolver = ContentResolver::new(templates, adapters.generator.clone(), settings.ai_timeout);
    let retry = RetryManager::new(summaries.clone(), jobs.clone(), time.clone());

    let ports = DispatchPorts {
        agents: agents.clone(),
        appointments,
        conversations,
        summaries: summaries.clone(),
        counters,
        channel: adapters.channel.clone(),
        webhooks: adapters.webhooks.clone(),
        lock,
    };
    let dispatcher = Dispatcher::new(
        ports,
        jobs.clone(),
        resolver.clone(),
        retry,
        time.clone(),
        settings.dispatch,
    );

    let scheduler = Arc::new(SchedulerWorker::new(
        reminders.clone(),
        followups.clone(),
        summaries.clone(),
        detector.clone(),
        dispatcher.clone(),
        time.clone(),
        settings.scheduler,
    ));

    Engine {
        event_bus: Arc::new(LocalEventBus::new(1024)),
        job_query_service: JobQueryService::new(reminders, followups, summaries),
        reminder_test_service: ReminderTestService::new(agents, resolver, adapters.channel, time),
        jobs,
        detector,
        dispatcher,
        scheduler,
    }
}

pub async fn build_app_state(
    db: Database,
    config: &Config,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let task_spawner = Arc::new(TokioTaskSpawner::new()) as Arc<dyn TaskSpawner>;

    let engine = build_engine(
        &db,
        Adapters::from_config(config),
        EngineSettings::from_config(config),
    );

    // Start trigger listener background task
    let listener_bus = engine.event_bus.clone();
    let listener_detector = engine.detector.clone();
    task_spawner.spawn(Box::pin(async move {
        crate::application::listeners::run_trigger_listener(listener_bus, listener_detector).await;
    }));

    // Start scheduler background task
    let scheduler = engine.scheduler.clone();
    task_spawner.spawn(Box::pin(async move {
        scheduler.run().await;
    }));
    tracing::info!("Scheduler started (instance {})", config.instance_id);

    Ok(AppState {
        detector: engine.detector,
        job_query_service: engine.job_query_service,
        reminder_test_service: engine.reminder_test_service,
        agent_repo: Arc::new(db) as Arc<dyn AgentRepository>,
    })
}
