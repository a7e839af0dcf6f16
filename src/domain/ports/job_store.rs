use chrono::{DateTime, Utc};

use crate::domain::entities::{DeliveryMeta, JobKind, JobStatus};
use crate::infrastructure::http::middleware::error::ApiResult;

/// A status change requested for a persisted job
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    Sent {
        at: DateTime<Utc>,
        meta: DeliveryMeta,
    },
    Failed {
        error: String,
    },
    Skipped {
        reason: String,
        ai_reason: Option<String>,
    },
    Cancelled {
        reason: String,
    },
    /// Back to `pending`, due again at `until`
    Deferred {
        until: DateTime<Utc>,
        reason: String,
    },
    /// Back to `pending` with its claim dropped and its schedule untouched
    Released,
}

impl JobTransition {
    pub fn target(&self) -> JobStatus {
        match self {
            JobTransition::Sent { .. } => JobStatus::Sent,
            JobTransition::Failed { .. } => JobStatus::Failed,
            JobTransition::Skipped { .. } => JobStatus::Skipped,
            JobTransition::Cancelled { .. } => JobStatus::Cancelled,
            JobTransition::Deferred { .. } | JobTransition::Released => JobStatus::Pending,
        }
    }
}

/// Kind-agnostic status persistence used by the job state machine
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    async fn job_status(&self, kind: JobKind, id: &str) -> ApiResult<Option<JobStatus>>;

    /// Apply the transition only if the job is still in one of `from`.
    /// Returns whether a row changed.
    async fn apply_transition(
        &self,
        kind: JobKind,
        id: &str,
        from: &[JobStatus],
        transition: &JobTransition,
        now: DateTime<Utc>,
    ) -> ApiResult<bool>;
}
