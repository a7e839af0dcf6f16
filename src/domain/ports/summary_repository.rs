use chrono::{DateTime, Utc};

use crate::domain::entities::{JobStatus, SummaryJob};
use crate::infrastructure::http::middleware::error::ApiResult;

#[async_trait::async_trait]
pub trait SummaryRepository: Send + Sync {
    /// Returns false when the episode already has a summary job
    async fn insert_summary_job(&self, job: &SummaryJob) -> ApiResult<bool>;

    async fn claim_due_summaries(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> ApiResult<Vec<SummaryJob>>;

    async fn store_summary_text(&self, id: &str, text: &str, now: DateTime<Utc>) -> ApiResult<()>;

    /// Count one delivery attempt and remember its error. Returns the new attempt count.
    async fn record_webhook_attempt(
        &self,
        id: &str,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> ApiResult<i64>;

    /// Leased jobs are skipped, as for reminders
    async fn cancel_pending_summaries_for_conversation(
        &self,
        conversation_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<u64>;

    async fn get_summary_job(&self, id: &str) -> ApiResult<Option<SummaryJob>>;

    async fn list_summary_jobs(
        &self,
        agent_id: i64,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<SummaryJob>, i64)>;

    async fn delete_summary_job(&self, id: &str) -> ApiResult<bool>;
}
