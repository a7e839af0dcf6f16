use chrono::{DateTime, Utc};

use crate::domain::entities::{FollowupJob, JobStatus};
use crate::infrastructure::http::middleware::error::ApiResult;

#[async_trait::async_trait]
pub trait FollowupRepository: Send + Sync {
    /// Returns false when the step already exists for this episode
    async fn insert_followup_job(&self, job: &FollowupJob) -> ApiResult<bool>;

    /// Move up to `limit` due follow-ups to `evaluating`. A step is never claimed
    /// while an earlier step of the same episode is still live.
    async fn claim_due_followups(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> ApiResult<Vec<FollowupJob>>;

    async fn cancel_pending_followups_for_conversation(
        &self,
        conversation_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<u64>;

    /// Cancel the pending steps that follow `after_number` within one episode
    async fn cancel_pending_followups_after(
        &self,
        conversation_id: i64,
        episode_anchor: DateTime<Utc>,
        after_number: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<u64>;

    async fn cancel_pending_followups_for_agent(
        &self,
        agent_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<u64>;

    async fn get_followup_job(&self, id: &str) -> ApiResult<Option<FollowupJob>>;

    async fn list_followup_jobs(
        &self,
        agent_id: i64,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<FollowupJob>, i64)>;

    async fn delete_followup_job(&self, id: &str) -> ApiResult<bool>;
}
