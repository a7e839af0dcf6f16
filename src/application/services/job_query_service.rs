use std::sync::Arc;

use crate::domain::entities::{FollowupJob, JobKind, JobStatus, ReminderJob, SummaryJob};
use crate::domain::ports::followup_repository::FollowupRepository;
use crate::domain::ports::reminder_repository::ReminderRepository;
use crate::domain::ports::summary_repository::SummaryRepository;
use crate::infrastructure::http::middleware::error::{ApiError, ApiResult};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// A page of jobs plus the total matching the filter
#[derive(Debug, Clone)]
pub struct JobPage<T> {
    pub jobs: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl JobFilter {
    fn bounds(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// Read and delete access to persisted jobs
#[derive(Clone)]
pub struct JobQueryService {
    reminders: Arc<dyn ReminderRepository>,
    followups: Arc<dyn FollowupRepository>,
    summaries: Arc<dyn SummaryRepository>,
}

impl JobQueryService {
    pub fn new(
        reminders: Arc<dyn ReminderRepository>,
        followups: Arc<dyn FollowupRepository>,
        summaries: Arc<dyn SummaryRepository>,
    ) -> Self {
        Self {
            reminders,
            followups,
            summaries,
        }
    }

    pub async fn list_reminder_jobs(
        &self,
        agent_id: i64,
        filter: JobFilter,
    ) -> ApiResult<JobPage<ReminderJob>> {
        let (limit, offset) = filter.bounds();
        let (jobs, total) = self
            .reminders
            .list_reminder_jobs(agent_id, filter.status, limit, offset)
            .await?;
        Ok(JobPage { jobs, total, limit, offset })
    }

    pub async fn list_followup_jobs(
        &self,
        agent_id: i64,
        filter: JobFilter,
    ) -> ApiResult<JobPage<FollowupJob>> {
        let (limit, offset) = filter.bounds();
        let (jobs, total) = self
            .followups
            .list_followup_jobs(agent_id, filter.status, limit, offset)
            .await?;
        Ok(JobPage { jobs, total, limit, offset })
    }

    pub async fn list_summary_jobs(
        &self,
        agent_id: i64,
        filter: JobFilter,
    ) -> ApiResult<JobPage<SummaryJob>> {
        let (limit, offset) = filter.bounds();
        let (jobs, total) = self
            .summaries
            .list_summary_jobs(agent_id, filter.status, limit, offset)
            .await?;
        Ok(JobPage { jobs, total, limit, offset })
    }

    pub async fn get_reminder_job(&self, id: &str) -> ApiResult<ReminderJob> {
        self.reminders
            .get_reminder_job(id)
            .await?
            .ok_or_else(|| not_found(JobKind::Reminder, id))
    }

    pub async fn get_followup_job(&self, id: &str) -> ApiResult<FollowupJob> {
        self.followups
            .get_followup_job(id)
            .await?
            .ok_or_else(|| not_found(JobKind::Followup, id))
    }

    pub async fn get_summary_job(&self, id: &str) -> ApiResult<SummaryJob> {
        self.summaries
            .get_summary_job(id)
            .await?
            .ok_or_else(|| not_found(JobKind::Summary, id))
    }

    pub async fn delete_job(&self, kind: JobKind, id: &str) -> ApiResult<()> {
        let deleted = match kind {
            JobKind::Reminder => self.reminders.delete_reminder_job(id).await?,
            JobKind::Followup => self.followups.delete_followup_job(id).await?,
            JobKind::Summary => self.summaries.delete_summary_job(id).await?,
        };
        if !deleted {
            return Err(not_found(kind, id));
        }
        tracing::info!("Deleted {} job {}", kind, id);
        Ok(())
    }
}

fn not_found(kind: JobKind, id: &str) -> ApiError {
    ApiError::NotFound(format!("{} job {} not found", kind, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_bounds_clamp_page() {
        let filter = JobFilter {
            status: None,
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!(filter.bounds(), (MAX_PAGE_SIZE, 0));
        assert_eq!(JobFilter::default().bounds(), (DEFAULT_PAGE_SIZE, 0));
    }
}
