use crate::{
    application::services::{JobFilter, JobPage},
    domain::entities::{FollowupJob, JobKind, JobStatus, ReminderJob, SummaryJob},
    infrastructure::http::middleware::{ApiError, ApiResult, AppState},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct JobListParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl JobListParams {
    fn filter(&self) -> ApiResult<JobFilter> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<JobStatus>)
            .transpose()
            .map_err(ApiError::BadRequest)?;
        Ok(JobFilter {
            status,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct JobListResponse<T> {
    pub jobs: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> From<JobPage<T>> for JobListResponse<T> {
    fn from(page: JobPage<T>) -> Self {
        Self {
            jobs: page.jobs,
            total: page.total,
            limit: page.limit,
            offset: page.offset,
        }
    }
}

pub async fn list_reminder_jobs(
    State(state): State<AppState>,
    Path(agent_id): Path<i64>,
    Query(params): Query<JobListParams>,
) -> ApiResult<Json<JobListResponse<ReminderJob>>> {
    let page = state
        .job_query_service
        .list_reminder_jobs(agent_id, params.filter()?)
        .await?;
    Ok(Json(page.into()))
}

pub async fn list_followup_jobs(
    State(state): State<AppState>,
    Path(agent_id): Path<i64>,
    Query(params): Query<JobListParams>,
) -> ApiResult<Json<JobListResponse<FollowupJob>>> {
    let page = state
        .job_query_service
        .list_followup_jobs(agent_id, params.filter()?)
        .await?;
    Ok(Json(page.into()))
}

pub async fn list_summary_jobs(
    State(state): State<AppState>,
    Path(agent_id): Path<i64>,
    Query(params): Query<JobListParams>,
) -> ApiResult<Json<JobListResponse<SummaryJob>>> {
    let page = state
        .job_query_service
        .list_summary_jobs(agent_id, params.filter()?)
        .await?;
    Ok(Json(page.into()))
}

pub async fn get_reminder_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ReminderJob>> {
    Ok(Json(state.job_query_service.get_reminder_job(&id).await?))
}

pub async fn get_followup_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<FollowupJob>> {
    Ok(Json(state.job_query_service.get_followup_job(&id).await?))
}

pub async fn get_summary_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SummaryJob>> {
    Ok(Json(state.job_query_service.get_summary_job(&id).await?))
}

pub async fn delete_reminder_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.job_query_service.delete_job(JobKind::Reminder, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_followup_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.job_query_service.delete_job(JobKind::Followup, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_summary_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.job_query_service.delete_job(JobKind::Summary, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
