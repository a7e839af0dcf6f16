use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::entities::{
    DeliveryMeta, FollowupJob, JobKind, JobStatus, ReminderJob, SummaryJob,
};
use crate::domain::errors::TransitionError;
use crate::domain::ports::followup_repository::FollowupRepository;
use crate::domain::ports::job_store::{JobStore, JobTransition};
use crate::domain::ports::reminder_repository::ReminderRepository;
use crate::domain::ports::summary_repository::SummaryRepository;
use crate::domain::ports::time_service::TimeService;
use crate::domain::services::{source_states, validate_transition};
use crate::infrastructure::http::middleware::error::ApiResult;

/// Owns every status change of a persisted job.
///
/// Changes are conditional updates guarded by the legal source states, so when two
/// workers race for the same job exactly one of them wins.
#[derive(Clone)]
pub struct JobStateMachine {
    store: Arc<dyn JobStore>,
    reminders: Arc<dyn ReminderRepository>,
    followups: Arc<dyn FollowupRepository>,
    summaries: Arc<dyn SummaryRepository>,
    time: Arc<dyn TimeService>,
}

impl JobStateMachine {
    pub fn new(
        store: Arc<dyn JobStore>,
        reminders: Arc<dyn ReminderRepository>,
        followups: Arc<dyn FollowupRepository>,
        summaries: Arc<dyn SummaryRepository>,
        time: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            store,
            reminders,
            followups,
            summaries,
            time,
        }
    }

    /// Returns false when a live job with the same identity already exists
    pub async fn create_reminder(&self, job: &ReminderJob) -> ApiResult<bool> {
        let created = self.reminders.insert_reminder_job(job).await?;
        if created {
            tracing::debug!(
                "Created reminder job {} for appointment {} ({}) due {}",
                job.id,
                job.appointment_id,
                job.recipient,
                job.scheduled_for
            );
        }
        Ok(created)
    }

    pub async fn create_followup(&self, job: &FollowupJob) -> ApiResult<bool> {
        let created = self.followups.insert_followup_job(job).await?;
        if created {
            tracing::debug!(
                "Created follow-up job {} #{} for conversation {} due {}",
                job.id,
                job.followup_number,
                job.conversation_id,
                job.scheduled_for
            );
        }
        Ok(created)
    }

    pub async fn create_summary(&self, job: &SummaryJob) -> ApiResult<bool> {
        let created = self.summaries.insert_summary_job(job).await?;
        if created {
            tracing::debug!(
                "Created summary job {} for conversation {}",
                job.id,
                job.conversation_id
            );
        }
        Ok(created)
    }

    /// Idempotent: cancelling a job that already finished is a no-op that returns false
    pub async fn cancel(
        &self,
        kind: JobKind,
        id: &str,
        reason: &str,
    ) -> Result<bool, TransitionError> {
        let transition = JobTransition::Cancelled {
            reason: reason.to_string(),
        };
        match self.apply(kind, id, transition).await {
            Err(TransitionError::InvalidTransition { .. }) => Ok(false),
            other => other,
        }
    }

    pub async fn mark_sent(
        &self,
        kind: JobKind,
        id: &str,
        meta: DeliveryMeta,
    ) -> Result<bool, TransitionError> {
        let at = self.time.now();
        self.apply(kind, id, JobTransition::Sent { at, meta }).await
    }

    pub async fn mark_failed(
        &self,
        kind: JobKind,
        id: &str,
        error: &str,
    ) -> Result<bool, TransitionError> {
        let transition = JobTransition::Failed {
            error: error.to_string(),
        };
        self.apply(kind, id, transition).await
    }

    pub async fn mark_skipped(
        &self,
        kind: JobKind,
        id: &str,
        reason: &str,
        ai_reason: Option<String>,
    ) -> Result<bool, TransitionError> {
        let transition = JobTransition::Skipped {
            reason: reason.to_string(),
            ai_reason,
        };
        self.apply(kind, id, transition).await
    }

    /// Re-arm a live job for a later evaluation. The job is never re-created.
    pub async fn defer(
        &self,
        kind: JobKind,
        id: &str,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, TransitionError> {
        let transition = JobTransition::Deferred {
            until,
            reason: reason.to_string(),
        };
        self.apply(kind, id, transition).await
    }

    /// Drop a claim without evaluating the job, leaving its schedule untouched
    pub async fn release(&self, kind: JobKind, id: &str) -> Result<bool, TransitionError> {
        self.apply(kind, id, JobTransition::Released).await
    }

    pub async fn cancel_followups_for_conversation(
        &self,
        conversation_id: i64,
        reason: &str,
    ) -> ApiResult<u64> {
        let now = self.time.now();
        self.followups
            .cancel_pending_followups_for_conversation(conversation_id, reason, now)
            .await
    }

    /// Cancel the steps of `job`'s episode that come after it. A newer episode of the
    /// same conversation is left alone.
    pub async fn cancel_later_steps(&self, job: &FollowupJob, reason: &str) -> ApiResult<u64> {
        let now = self.time.now();
        self.followups
            .cancel_pending_followups_after(
                job.conversation_id,
                job.episode_anchor,
                job.followup_number,
                reason,
                now,
            )
            .await
    }

    pub async fn cancel_followups_for_agent(&self, agent_id: i64, reason: &str) -> ApiResult<u64> {
        let now = self.time.now();
        self.followups
            .cancel_pending_followups_for_agent(agent_id, reason, now)
            .await
    }

    pub async fn cancel_reminders_for_appointment(
        &self,
        appointment_id: i64,
        reason: &str,
    ) -> ApiResult<u64> {
        let now = self.time.now();
        self.reminders
            .cancel_pending_reminders_for_appointment(appointment_id, reason, now)
            .await
    }

    pub async fn cancel_reminders_for_agent(&self, agent_id: i64, reason: &str) -> ApiResult<u64> {
        let now = self.time.now();
        self.reminders
            .cancel_pending_reminders_for_agent(agent_id, reason, now)
            .await
    }

    pub async fn cancel_summaries_for_conversation(
        &self,
        conversation_id: i64,
        reason: &str,
    ) -> ApiResult<u64> {
        let now = self.time.now();
        self.summaries
            .cancel_pending_summaries_for_conversation(conversation_id, reason, now)
            .await
    }

    async fn apply(
        &self,
        kind: JobKind,
        id: &str,
        transition: JobTransition,
    ) -> Result<bool, TransitionError> {
        let to = transition.target();
        let now = self.time.now();

        let changed = self
            .store
            .apply_transition(kind, id, source_states(to), &transition, now)
            .await
            .map_err(|e| TransitionError::Storage(e.to_string()))?;
        if changed {
            tracing::debug!("{} job {} -> {}", kind, id, to);
            return Ok(true);
        }

        // Nothing matched: either the job is gone or it already left the source states
        let current = self
            .store
            .job_status(kind, id)
            .await
            .map_err(|e| TransitionError::Storage(e.to_string()))?
            .ok_or_else(|| TransitionError::NotFound {
                kind,
                id: id.to_string(),
            })?;
        validate_transition(current, to)?;

        tracing::warn!(
            "{} job {} is {} and was not moved to {}",
            kind,
            id,
            current,
            to
        );
        Ok(false)
    }

    pub async fn status(&self, kind: JobKind, id: &str) -> ApiResult<Option<JobStatus>> {
        self.store.job_status(kind, id).await
    }
}
