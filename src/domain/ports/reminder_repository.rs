use chrono::{DateTime, Utc};

use crate::domain::entities::{JobStatus, ReminderJob};
use crate::infrastructure::http::middleware::error::ApiResult;

#[async_trait::async_trait]
pub trait ReminderRepository: Send + Sync {
    /// Returns false when a live job for the same (appointment, rule, recipient,
    /// scheduled_for) already exists
    async fn insert_reminder_job(&self, job: &ReminderJob) -> ApiResult<bool>;

    /// Atomically lease up to `limit` due reminders until `lease_until`
    async fn claim_due_reminders(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> ApiResult<Vec<ReminderJob>>;

    /// Cancel an appointment's pending reminders. Jobs currently leased by a worker are
    /// left to finish; the dispatcher re-reads the appointment before sending.
    async fn cancel_pending_reminders_for_appointment(
        &self,
        appointment_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<u64>;

    async fn cancel_pending_reminders_for_agent(
        &self,
        agent_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<u64>;

    async fn get_reminder_job(&self, id: &str) -> ApiResult<Option<ReminderJob>>;

    async fn list_reminder_jobs(
        &self,
        agent_id: i64,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<ReminderJob>, i64)>;

    async fn delete_reminder_job(&self, id: &str) -> ApiResult<bool>;
}
