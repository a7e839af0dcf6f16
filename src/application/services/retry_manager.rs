use std::sync::Arc;

use crate::application::services::JobStateMachine;
use crate::domain::entities::{JobKind, SummaryConfig, SummaryJob};
use crate::domain::errors::DeliveryError;
use crate::domain::ports::summary_repository::SummaryRepository;
use crate::domain::ports::time_service::TimeService;
use crate::domain::services::{next_attempt, RetryDecision};
use crate::infrastructure::http::middleware::error::ApiResult;

/// Where a webhook job ended up after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    Retrying,
    Failed,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Delivered => "delivered",
            AttemptOutcome::Retrying => "retrying",
            AttemptOutcome::Failed => "failed",
        }
    }
}

/// Bounded constant-delay retries for webhook jobs.
///
/// Every attempt, successful or not, is counted on the job, so a job makes at most
/// `webhook_retry_count + 1` attempts.
#[derive(Clone)]
pub struct RetryManager {
    summaries: Arc<dyn SummaryRepository>,
    jobs: JobStateMachine,
    time: Arc<dyn TimeService>,
}

impl RetryManager {
    pub fn new(
        summaries: Arc<dyn SummaryRepository>,
        jobs: JobStateMachine,
        time: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            summaries,
            jobs,
            time,
        }
    }

    pub async fn record_success(&self, job: &SummaryJob) -> ApiResult<i64> {
        let attempts = self
            .summaries
            .record_webhook_attempt(&job.id, None, self.time.now())
            .await?;
        metrics::counter!("webhook_attempts_total", "outcome" => AttemptOutcome::Delivered.as_str())
            .increment(1);
        Ok(attempts)
    }

    pub async fn record_failure(
        &self,
        job: &SummaryJob,
        config: &SummaryConfig,
        error: &DeliveryError,
    ) -> ApiResult<AttemptOutcome> {
        let now = self.time.now();
        let message = error.to_string();
        let attempts = self
            .summaries
            .record_webhook_attempt(&job.id, Some(&message), now)
            .await?;

        let decision = if error.is_retryable() {
            next_attempt(attempts, config.webhook_retry_count, config.webhook_retry_delay, now)
        } else {
            RetryDecision::GiveUp
        };

        let outcome = match decision {
            RetryDecision::RetryAt(at) => {
                tracing::warn!(
                    "Summary job {} attempt {} failed ({}), retrying at {}",
                    job.id,
                    attempts,
                    message,
                    at
                );
                self.jobs
                    .defer(JobKind::Summary, &job.id, at, "awaiting retry")
                    .await?;
                AttemptOutcome::Retrying
            }
            RetryDecision::GiveUp => {
                tracing::error!(
                    "Summary job {} failed after {} attempts: {}",
                    job.id,
                    attempts,
                    message
                );
                self.jobs.mark_failed(JobKind::Summary, &job.id, &message).await?;
                AttemptOutcome::Failed
            }
        };

        metrics::counter!("webhook_attempts_total", "outcome" => outcome.as_str()).increment(1);
        Ok(outcome)
    }
}
