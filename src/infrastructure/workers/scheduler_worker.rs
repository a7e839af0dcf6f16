use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::application::services::{DispatchOutcome, Dispatcher, TriggerDetector};
use crate::domain::entities::{ClaimedJob, JobKind};
use crate::domain::ports::followup_repository::FollowupRepository;
use crate::domain::ports::reminder_repository::ReminderRepository;
use crate::domain::ports::summary_repository::SummaryRepository;
use crate::domain::ports::time_service::TimeService;
use crate::infrastructure::http::middleware::error::{ApiError, ApiResult};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    /// Concurrent dispatches across passes
    pub workers: usize,
    /// Jobs claimed per kind per tick
    pub batch_size: i64,
    /// How long a claim stays exclusive before another instance may take it over
    pub lease: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            workers: 8,
            batch_size: 50,
            lease: Duration::from_secs(300),
        }
    }
}

/// Counts of what one tick did, keyed by outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub summaries_created: usize,
    pub claimed: usize,
    pub outcomes: BTreeMap<&'static str, usize>,
    pub errors: usize,
}

type DispatchResult = (JobKind, String, ApiResult<DispatchOutcome>);

fn record(joined: Result<DispatchResult, JoinError>, report: &mut TickReport) {
    match joined {
        Ok((kind, _, Ok(outcome))) => {
            metrics::counter!(
                "scheduler_jobs_total",
                "kind" => kind.as_str(),
                "outcome" => outcome.as_str()
            )
            .increment(1);
            *report.outcomes.entry(outcome.as_str()).or_default() += 1;
        }
        Ok((kind, id, Err(e))) => {
            // The lease runs out and the job is claimed again
            warn!("Dispatch of {} job {} errored: {}", kind, id, e);
            metrics::counter!("scheduler_jobs_total", "kind" => kind.as_str(), "outcome" => "error")
                .increment(1);
            report.errors += 1;
        }
        Err(e) => {
            error!("Dispatch task panicked: {}", e);
            report.errors += 1;
        }
    }
}

impl TickReport {
    pub fn count(&self, outcome: DispatchOutcome) -> usize {
        self.outcomes.get(outcome.as_str()).copied().unwrap_or(0)
    }
}

/// Polls the job tables, claims due work and runs it on a bounded pool
pub struct SchedulerWorker {
    reminders: Arc<dyn ReminderRepository>,
    followups: Arc<dyn FollowupRepository>,
    summaries: Arc<dyn SummaryRepository>,
    detector: TriggerDetector,
    dispatcher: Dispatcher,
    time_service: Arc<dyn TimeService>,
    settings: SchedulerSettings,
    permits: Arc<Semaphore>,
}

impl SchedulerWorker {
    pub fn new(
        reminders: Arc<dyn ReminderRepository>,
        followups: Arc<dyn FollowupRepository>,
        summaries: Arc<dyn SummaryRepository>,
        detector: TriggerDetector,
        dispatcher: Dispatcher,
        time_service: Arc<dyn TimeService>,
        settings: SchedulerSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.workers.max(1)));
        Self {
            reminders,
            followups,
            summaries,
            detector,
            dispatcher,
            time_service,
            settings,
            permits,
        }
    }

    /// Poll forever. Dispatches outlive the pass that claimed them, so a slow AI call
    /// or webhook only holds its own permit while the loop keeps claiming.
    pub async fn run(&self) {
        info!(
            "Starting scheduler (poll every {:?}, {} workers, batch {})",
            self.settings.poll_interval, self.settings.workers, self.settings.batch_size
        );
        let mut in_flight = JoinSet::new();
        loop {
            let started = Instant::now();

            let mut finished = TickReport::default();
            while let Some(joined) = in_flight.try_join_next() {
                record(joined, &mut finished);
            }
            if !finished.outcomes.is_empty() || finished.errors > 0 {
                debug!("Finished dispatches: {:?}", finished);
            }

            match self.poll(&mut in_flight).await {
                Ok(report) => {
                    if report.claimed > 0 || report.summaries_created > 0 {
                        debug!(
                            "Scheduler pass: {} claimed, {} summaries created, {} in flight",
                            report.claimed,
                            report.summaries_created,
                            in_flight.len()
                        );
                    }
                }
                Err(e) => error!("Scheduler pass failed: {}", e),
            }
            metrics::histogram!("scheduler_tick_seconds").record(started.elapsed().as_secs_f64());

            self.time_service.sleep(self.settings.poll_interval).await;
        }
    }

    /// One scheduling pass that waits for its own dispatches to finish
    pub async fn tick(&self) -> ApiResult<TickReport> {
        let mut tasks = JoinSet::new();
        let mut report = self.poll(&mut tasks).await?;
        while let Some(joined) = tasks.join_next().await {
            record(joined, &mut report);
        }
        Ok(report)
    }

    /// Detect idle conversations, then claim as much due work as there are free
    /// permits and spawn it onto `tasks` without waiting.
    async fn poll(&self, tasks: &mut JoinSet<DispatchResult>) -> ApiResult<TickReport> {
        let mut report = TickReport {
            summaries_created: self.detector.scan_inactivity().await?,
            ..Default::default()
        };

        let capacity = self.permits.available_permits() as i64;
        if capacity == 0 {
            debug!("All {} workers busy, skipping claim", self.settings.workers);
            return Ok(report);
        }

        let claimed = self.claim_due(capacity).await?;
        report.claimed = claimed.len();

        for job in claimed {
            let permits = self.permits.clone();
            let dispatcher = self.dispatcher.clone();
            tasks.spawn(async move {
                let kind = job.kind();
                let id = job.id().to_string();
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let error = ApiError::Internal(format!("worker pool closed: {}", e));
                        return (kind, id, Err(error));
                    }
                };
                let outcome = dispatcher.dispatch(job).await;
                (kind, id, outcome)
            });
        }

        Ok(report)
    }

    /// Claim at most `capacity` jobs across the three kinds, reminders first
    async fn claim_due(&self, capacity: i64) -> ApiResult<Vec<ClaimedJob>> {
        let now = self.time_service.now();
        let lease = chrono::Duration::from_std(self.settings.lease)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let lease_until = now + lease;
        let limit = |taken: usize| self.settings.batch_size.max(1).min(capacity - taken as i64);

        let mut claimed: Vec<ClaimedJob> = self
            .reminders
            .claim_due_reminders(now, lease_until, limit(0))
            .await?
            .into_iter()
            .map(ClaimedJob::Reminder)
            .collect();

        let remaining = limit(claimed.len());
        if remaining > 0 {
            let followups = self
                .followups
                .claim_due_followups(now, lease_until, remaining)
                .await?;
            claimed.extend(followups.into_iter().map(ClaimedJob::Followup));
        }

        let remaining = limit(claimed.len());
        if remaining > 0 {
            let summaries = self
                .summaries
                .claim_due_summaries(now, lease_until, remaining)
                .await?;
            claimed.extend(summaries.into_iter().map(ClaimedJob::Summary));
        }

        if !claimed.is_empty() {
            let count = |kind: JobKind| claimed.iter().filter(|job| job.kind() == kind).count();
            info!(
                "Claimed {} reminder, {} follow-up and {} summary jobs",
                count(JobKind::Reminder),
                count(JobKind::Followup),
                count(JobKind::Summary)
            );
        }
        Ok(claimed)
    }
}
