use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{any::AnyRow, Row};

use crate::domain::entities::{FollowupJob, JobStatus, SentVia};
use crate::domain::ports::followup_repository::FollowupRepository;
use crate::infrastructure::http::middleware::error::{ApiError, ApiResult};
use crate::infrastructure::persistence::{get_enum, get_opt, get_opt_ts, get_ts, ts, Database};

const FOLLOWUP_COLUMNS: &str = "id, agent_id, conversation_id, followup_number, episode_anchor, \
     scheduled_for, status, status_reason, sent_via, content, template_name, ai_reason, \
     error_message, sent_at, locked_until, created_at, updated_at";

// A claimable follow-up is pending and unleased, or stuck in `evaluating` after its
// worker's lease ran out.
const CLAIMABLE: &str = "((status = 'pending' AND (locked_until IS NULL OR locked_until < ?))
       OR (status = 'evaluating' AND locked_until < ?))";

fn followup_from_row(row: &AnyRow) -> ApiResult<FollowupJob> {
    let sent_via: Option<String> = get_opt(row, "sent_via");
    let sent_via = sent_via
        .as_deref()
        .map(str::parse::<SentVia>)
        .transpose()
        .map_err(ApiError::Internal)?;

    Ok(FollowupJob {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        conversation_id: row.try_get("conversation_id")?,
        followup_number: row.try_get("followup_number")?,
        episode_anchor: get_ts(row, "episode_anchor")?,
        scheduled_for: get_ts(row, "scheduled_for")?,
        status: get_enum(row, "status")?,
        status_reason: get_opt(row, "status_reason"),
        sent_via,
        content: get_opt(row, "content"),
        template_name: get_opt(row, "template_name"),
        ai_reason: get_opt(row, "ai_reason"),
        error_message: get_opt(row, "error_message"),
        sent_at: get_opt_ts(row, "sent_at")?,
        locked_until: get_opt_ts(row, "locked_until")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

#[async_trait]
impl FollowupRepository for Database {
    async fn insert_followup_job(&self, job: &FollowupJob) -> ApiResult<bool> {
        let result = sqlx::query(
            "INSERT INTO followup_jobs (id, agent_id, conversation_id, followup_number, episode_anchor,
                                        scheduled_for, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(&job.id)
        .bind(job.agent_id)
        .bind(job.conversation_id)
        .bind(job.followup_number)
        .bind(ts(job.episode_anchor))
        .bind(ts(job.scheduled_for))
        .bind(job.status.as_str())
        .bind(ts(job.created_at))
        .bind(ts(job.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_due_followups(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> ApiResult<Vec<FollowupJob>> {
        let now_str = ts(now);
        let candidates = sqlx::query(
            "SELECT f.id FROM followup_jobs f
             WHERE f.scheduled_for <= ?
               AND ((f.status = 'pending' AND (f.locked_until IS NULL OR f.locked_until < ?))
                    OR (f.status = 'evaluating' AND f.locked_until < ?))
               AND NOT EXISTS (
                   SELECT 1 FROM followup_jobs e
                   WHERE e.conversation_id = f.conversation_id
                     AND e.episode_anchor = f.episode_anchor
                     AND e.followup_number < f.followup_number
                     AND e.status IN ('pending', 'evaluating')
               )
             ORDER BY f.scheduled_for ASC, f.followup_number ASC
             LIMIT ?",
        )
        .bind(&now_str)
        .bind(&now_str)
        .bind(&now_str)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = Vec::new();
        for candidate in candidates {
            let id: String = candidate.try_get("id")?;

            let result = sqlx::query(&format!(
                "UPDATE followup_jobs
                 SET status = 'evaluating', locked_until = ?, updated_at = ?
                 WHERE id = ? AND {}",
                CLAIMABLE
            ))
            .bind(ts(lease_until))
            .bind(&now_str)
            .bind(&id)
            .bind(&now_str)
            .bind(&now_str)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                continue;
            }

            if let Some(job) = self.get_followup_job(&id).await? {
                claimed.push(job);
            }
        }

        Ok(claimed)
    }

    async fn cancel_pending_followups_for_conversation(
        &self,
        conversation_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<u64> {
        let result = sqlx::query(
            "UPDATE followup_jobs
             SET status = 'cancelled', status_reason = ?, locked_until = NULL, updated_at = ?
             WHERE conversation_id = ? AND status = 'pending'",
        )
        .bind(reason)
        .bind(ts(now))
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn cancel_pending_followups_after(
        &self,
        conversation_id: i64,
        episode_anchor: DateTime<Utc>,
        after_number: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<u64> {
        let result = sqlx::query(
            "UPDATE followup_jobs
             SET status = 'cancelled', status_reason = ?, locked_until = NULL, updated_at = ?
             WHERE conversation_id = ? AND episode_anchor = ? AND followup_number > ?
               AND status = 'pending'",
        )
        .bind(reason)
        .bind(ts(now))
        .bind(conversation_id)
        .bind(ts(episode_anchor))
        .bind(after_number)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn cancel_pending_followups_for_agent(
        &self,
        agent_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<u64> {
        let result = sqlx::query(
            "UPDATE followup_jobs
             SET status = 'cancelled', status_reason = ?, locked_until = NULL, updated_at = ?
             WHERE agent_id = ? AND status = 'pending'",
        )
        .bind(reason)
        .bind(ts(now))
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get_followup_job(&self, id: &str) -> ApiResult<Option<FollowupJob>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM followup_jobs WHERE id = ?",
            FOLLOWUP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(followup_from_row).transpose()
    }

    async fn list_followup_jobs(
        &self,
        agent_id: i64,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<FollowupJob>, i64)> {
        let status = status.map(|s| s.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {} FROM followup_jobs
             WHERE agent_id = ? AND (? IS NULL OR status = ?)
             ORDER BY scheduled_for DESC, followup_number DESC
             LIMIT ? OFFSET ?",
            FOLLOWUP_COLUMNS
        ))
        .bind(agent_id)
        .bind(status)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM followup_jobs
             WHERE agent_id = ? AND (? IS NULL OR status = ?)",
        )
        .bind(agent_id)
        .bind(status)
        .bind(status)
        .fetch_one(&self.pool)
        .await?
        .try_get("total")?;

        let jobs = rows
            .iter()
            .map(followup_from_row)
            .collect::<ApiResult<Vec<_>>>()?;
        Ok((jobs, total))
    }

    async fn delete_followup_job(&self, id: &str) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM followup_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
