use std::sync::Arc;
use std::time::Duration;

use crate::application::services::{AttemptOutcome, JobStateMachine, RetryManager};
use crate::domain::entities::{
    Agent, ClaimedJob, DeliveryMeta, FollowupJob, JobKind, ReminderJob, SummaryJob,
    SummaryWebhookPayload,
};
use crate::domain::errors::{DeliveryError, ResolutionError};
use crate::domain::ports::agent_repository::AgentRepository;
use crate::domain::ports::appointment_repository::AppointmentRepository;
use crate::domain::ports::channel_adapter::{ChannelAdapter, OutboundMessage};
use crate::domain::ports::conversation_repository::ConversationRepository;
use crate::domain::ports::distributed_lock::DistributedLock;
use crate::domain::ports::send_counter_repository::SendCounterRepository;
use crate::domain::ports::summary_repository::SummaryRepository;
use crate::domain::ports::time_service::TimeService;
use crate::domain::ports::webhook_sender::WebhookSender;
use crate::domain::services::webhook_signature::sign_payload;
use crate::domain::services::{
    evaluate_followup, evaluate_reminder, local_day, next_local_midnight, ContentResolver,
    FollowupPolicyInput, PolicyDecision, ResolvedContent, TemplateVariables,
};
use crate::infrastructure::http::middleware::error::ApiResult;

/// Final disposition of one dispatch, used for logs and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Failed,
    Skipped,
    Cancelled,
    Deferred,
    Retrying,
    /// Another dispatch held the conversation; the job is due again next tick
    Released,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::Failed => "failed",
            DispatchOutcome::Skipped => "skipped",
            DispatchOutcome::Cancelled => "cancelled",
            DispatchOutcome::Deferred => "deferred",
            DispatchOutcome::Retrying => "retrying",
            DispatchOutcome::Released => "released",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub instance_id: String,
    /// Upper bound on one dispatch; the conversation lock expires after it
    pub lock_ttl: Duration,
    pub history_limit: i64,
    pub signing_secret: Option<String>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            instance_id: "local".to_string(),
            lock_ttl: Duration::from_secs(120),
            history_limit: 20,
            signing_secret: None,
        }
    }
}

/// Ports the dispatcher reads from and delivers through
#[derive(Clone)]
pub struct DispatchPorts {
    pub agents: Arc<dyn AgentRepository>,
    pub appointments: Arc<dyn AppointmentRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub summaries: Arc<dyn SummaryRepository>,
    pub counters: Arc<dyn SendCounterRepository>,
    pub channel: Arc<dyn ChannelAdapter>,
    pub webhooks: Arc<dyn WebhookSender>,
    pub lock: Arc<dyn DistributedLock>,
}

/// Runs one claimed job through policy, content resolution and delivery
#[derive(Clone)]
pub struct Dispatcher {
    ports: DispatchPorts,
    jobs: JobStateMachine,
    resolver: ContentResolver,
    retry: RetryManager,
    time: Arc<dyn TimeService>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        ports: DispatchPorts,
        jobs: JobStateMachine,
        resolver: ContentResolver,
        retry: RetryManager,
        time: Arc<dyn TimeService>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            ports,
            jobs,
            resolver,
            retry,
            time,
            settings,
        }
    }

    /// Dispatch a claimed job while holding its conversation lock
    #[tracing::instrument(skip(self, job), fields(kind = %job.kind(), job_id = %job.id()))]
    pub async fn dispatch(&self, job: ClaimedJob) -> ApiResult<DispatchOutcome> {
        let key = job.dispatch_key();
        let owner = format!("{}:{}", self.settings.instance_id, job.id());

        if !self
            .ports
            .lock
            .acquire(&key, &owner, self.settings.lock_ttl.as_secs().max(1))
            .await?
        {
            tracing::debug!("{} busy, releasing {} job {}", key, job.kind(), job.id());
            self.jobs.release(job.kind(), job.id()).await?;
            return Ok(DispatchOutcome::Released);
        }

        let result = match &job {
            ClaimedJob::Reminder(reminder) => self.dispatch_reminder(reminder).await,
            ClaimedJob::Followup(followup) => self.dispatch_followup(followup).await,
            ClaimedJob::Summary(summary) => self.dispatch_summary(summary).await,
        };

        if let Err(e) = self.ports.lock.release(&key, &owner).await {
            tracing::warn!("Failed to release lock {}: {}", key, e);
        }
        result
    }

    async fn dispatch_reminder(&self, job: &ReminderJob) -> ApiResult<DispatchOutcome> {
        let kind = JobKind::Reminder;
        let Some(agent) = self.live_agent(kind, &job.id, job.agent_id).await? else {
            return Ok(DispatchOutcome::Cancelled);
        };
        if !agent.reminders.enabled {
            self.jobs.cancel(kind, &job.id, "config disabled").await?;
            return Ok(DispatchOutcome::Cancelled);
        }

        let appointment = self.ports.appointments.get_appointment(job.appointment_id).await?;
        let now = self.time.now();
        let appointment = match (evaluate_reminder(appointment.as_ref(), now), appointment) {
            (PolicyDecision::Fire, Some(appointment)) => appointment,
            (decision, _) => return self.apply_decision(kind, &job.id, decision).await,
        };

        let vars = TemplateVariables::for_appointment(&agent, &appointment);
        let history = match job.conversation_id {
            Some(conversation_id) => {
                self.ports
                    .conversations
                    .recent_messages(conversation_id, self.settings.history_limit)
                    .await?
            }
            None => Vec::new(),
        };

        let content = match self
            .resolver
            .resolve_reminder(&agent, &job.rule.content, &vars, history)
            .await
        {
            Ok(content) => content,
            Err(e) => return self.resolution_failed(kind, &job.id, e).await,
        };

        self.send(kind, &job.id, &agent, &job.destination, content).await
    }

    async fn dispatch_followup(&self, job: &FollowupJob) -> ApiResult<DispatchOutcome> {
        let kind = JobKind::Followup;
        let Some(agent) = self.live_agent(kind, &job.id, job.agent_id).await? else {
            return Ok(DispatchOutcome::Cancelled);
        };
        let config = &agent.followup;
        if !config.enabled {
            self.jobs.cancel(kind, &job.id, "config disabled").await?;
            return Ok(DispatchOutcome::Cancelled);
        }

        let Some(conversation) = self
            .ports
            .conversations
            .get_conversation(job.conversation_id)
            .await?
        else {
            self.jobs.cancel(kind, &job.id, "conversation not found").await?;
            return Ok(DispatchOutcome::Cancelled);
        };

        let now = self.time.now();
        let tz = agent.tz();
        let day = local_day(now, tz);
        let sent_today = self
            .ports
            .counters
            .sends_on(conversation.id, kind, &day)
            .await?;
        let last_sent_at = self.ports.counters.last_send(conversation.id, kind).await?;

        let input = FollowupPolicyInput {
            job,
            config,
            conversation: &conversation,
            sent_today,
            last_sent_at,
        };
        match evaluate_followup(&input, now, tz) {
            PolicyDecision::Fire => {}
            PolicyDecision::Cancel { reason } => {
                // Later steps of this episode go with it; a newer episode stays armed
                self.jobs.cancel(kind, &job.id, &reason).await?;
                self.jobs.cancel_later_steps(job, &reason).await?;
                return Ok(DispatchOutcome::Cancelled);
            }
            decision => return self.apply_decision(kind, &job.id, decision).await,
        }

        // The policy read may be stale under concurrency; the reservation is the real cap
        let cap = config.max_per_day.filter(|cap| *cap > 0);
        if let Some(cap) = cap {
            if !self
                .ports
                .counters
                .reserve_send(conversation.id, kind, &day, cap)
                .await?
            {
                self.jobs
                    .defer(
                        kind,
                        &job.id,
                        next_local_midnight(now, tz),
                        "daily follow-up cap reached",
                    )
                    .await?;
                return Ok(DispatchOutcome::Deferred);
            }
        }

        let history = self
            .ports
            .conversations
            .recent_messages(conversation.id, self.settings.history_limit)
            .await?;
        let resolved = self
            .resolver
            .resolve_followup(&agent, config, job, &conversation, history, now)
            .await;

        let outcome = match resolved {
            Ok(content) => {
                self.send(kind, &job.id, &agent, &conversation.customer_phone, content)
                    .await?
            }
            Err(e) => self.resolution_failed(kind, &job.id, e).await?,
        };

        if outcome != DispatchOutcome::Sent {
            if cap.is_some() {
                self.ports.counters.release_send(conversation.id, kind, &day).await?;
            }
            return Ok(outcome);
        }

        self.ports
            .counters
            .record_send(conversation.id, kind, self.time.now())
            .await?;

        if let Some(step) = config.step(job.followup_number + 1) {
            let next = FollowupJob::new(
                agent.id,
                conversation.id,
                job.followup_number + 1,
                job.episode_anchor,
                self.time.now() + step.delay(),
            );
            self.jobs.create_followup(&next).await?;
        }
        Ok(outcome)
    }

    async fn dispatch_summary(&self, job: &SummaryJob) -> ApiResult<DispatchOutcome> {
        let kind = JobKind::Summary;
        let Some(agent) = self.live_agent(kind, &job.id, job.agent_id).await? else {
            return Ok(DispatchOutcome::Cancelled);
        };
        let config = &agent.summary;
        if !config.enabled {
            self.jobs.cancel(kind, &job.id, "config disabled").await?;
            return Ok(DispatchOutcome::Cancelled);
        }
        if config.webhook_url.trim().is_empty() {
            self.jobs
                .mark_skipped(kind, &job.id, "no webhook configured", None)
                .await?;
            return Ok(DispatchOutcome::Skipped);
        }

        let Some(conversation) = self
            .ports
            .conversations
            .get_conversation(job.conversation_id)
            .await?
        else {
            self.jobs.cancel(kind, &job.id, "conversation not found").await?;
            return Ok(DispatchOutcome::Cancelled);
        };

        // The text survives retries so every attempt posts the same summary
        let summary = match &job.summary_text {
            Some(text) => text.clone(),
            None => {
                let history = self
                    .ports
                    .conversations
                    .recent_messages(conversation.id, self.settings.history_limit)
                    .await?;
                match self.resolver.generate_summary(&agent, config, history).await {
                    Ok(text) => {
                        self.ports
                            .summaries
                            .store_summary_text(&job.id, &text, self.time.now())
                            .await?;
                        text
                    }
                    Err(e) => {
                        let error =
                            DeliveryError::Transient(format!("summary generation failed: {}", e));
                        let outcome = self.retry.record_failure(job, config, &error).await?;
                        return Ok(attempt_outcome(outcome));
                    }
                }
            }
        };

        let now = self.time.now();
        let payload = SummaryWebhookPayload::new(&agent, &conversation, job, summary, now);
        let body = serde_json::to_string(&payload)?;
        let signature = self
            .settings
            .signing_secret
            .as_deref()
            .map(|secret| sign_payload(&body, secret));

        match self
            .ports
            .webhooks
            .deliver(&config.webhook_url, &body, signature.as_deref())
            .await
        {
            Ok(status) => {
                let attempts = self.retry.record_success(job).await?;
                self.jobs.mark_sent(kind, &job.id, DeliveryMeta::default()).await?;
                tracing::info!(
                    "Summary job {} delivered on attempt {} (HTTP {})",
                    job.id,
                    attempts,
                    status
                );
                Ok(DispatchOutcome::Sent)
            }
            Err(e) => {
                let outcome = self.retry.record_failure(job, config, &e).await?;
                Ok(attempt_outcome(outcome))
            }
        }
    }

    async fn send(
        &self,
        kind: JobKind,
        job_id: &str,
        agent: &Agent,
        to: &str,
        content: ResolvedContent,
    ) -> ApiResult<DispatchOutcome> {
        let mut meta = content.meta();
        let message = OutboundMessage {
            agent_id: agent.id,
            channel: agent.channel,
            to: to.to_string(),
            payload: content.payload,
            idempotency_key: job_id.to_string(),
        };

        match self.ports.channel.send(&message).await {
            Ok(receipt) => {
                meta.provider_message_id = receipt.provider_message_id;
                self.jobs.mark_sent(kind, job_id, meta).await?;
                tracing::info!(
                    "{} job {} sent to {} via {}",
                    kind,
                    job_id,
                    to,
                    self.ports.channel.name()
                );
                Ok(DispatchOutcome::Sent)
            }
            Err(e) => {
                tracing::error!("{} job {} delivery failed: {}", kind, job_id, e);
                self.jobs.mark_failed(kind, job_id, &e).await?;
                Ok(DispatchOutcome::Failed)
            }
        }
    }

    async fn resolution_failed(
        &self,
        kind: JobKind,
        job_id: &str,
        error: ResolutionError,
    ) -> ApiResult<DispatchOutcome> {
        match error {
            ResolutionError::Declined(reason) => {
                tracing::info!("{} job {} declined by AI: {}", kind, job_id, reason);
                self.jobs
                    .mark_skipped(kind, job_id, "ai declined to send", Some(reason))
                    .await?;
                Ok(DispatchOutcome::Skipped)
            }
            e if e.is_config_defect() => {
                tracing::warn!("{} job {} skipped: {}", kind, job_id, e);
                self.jobs.mark_skipped(kind, job_id, &e.to_string(), None).await?;
                Ok(DispatchOutcome::Skipped)
            }
            e => {
                tracing::error!("{} job {} content resolution failed: {}", kind, job_id, e);
                self.jobs.mark_failed(kind, job_id, &e.to_string()).await?;
                Ok(DispatchOutcome::Failed)
            }
        }
    }

    async fn apply_decision(
        &self,
        kind: JobKind,
        job_id: &str,
        decision: PolicyDecision,
    ) -> ApiResult<DispatchOutcome> {
        let outcome = match decision {
            PolicyDecision::Fire => return Ok(DispatchOutcome::Released),
            PolicyDecision::Defer { until, reason } => {
                tracing::debug!("{} job {} deferred until {}: {}", kind, job_id, until, reason);
                self.jobs.defer(kind, job_id, until, &reason).await?;
                DispatchOutcome::Deferred
            }
            PolicyDecision::Skip { reason } => {
                self.jobs.mark_skipped(kind, job_id, &reason, None).await?;
                DispatchOutcome::Skipped
            }
            PolicyDecision::Cancel { reason } => {
                self.jobs.cancel(kind, job_id, &reason).await?;
                DispatchOutcome::Cancelled
            }
        };
        Ok(outcome)
    }

    async fn live_agent(
        &self,
        kind: JobKind,
        job_id: &str,
        agent_id: i64,
    ) -> ApiResult<Option<Agent>> {
        let agent = self.ports.agents.get_agent(agent_id).await?;
        if agent.is_none() {
            self.jobs.cancel(kind, job_id, "agent not found").await?;
        }
        Ok(agent)
    }
}

fn attempt_outcome(outcome: AttemptOutcome) -> DispatchOutcome {
    match outcome {
        AttemptOutcome::Delivered => DispatchOutcome::Sent,
        AttemptOutcome::Retrying => DispatchOutcome::Retrying,
        AttemptOutcome::Failed => DispatchOutcome::Failed,
    }
}
