use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{any::AnyRow, Row};

use crate::domain::entities::{JobStatus, SummaryJob};
use crate::domain::ports::summary_repository::SummaryRepository;
use crate::infrastructure::http::middleware::error::{ApiError, ApiResult};
use crate::infrastructure::persistence::{get_enum, get_opt, get_opt_ts, get_ts, ts, Database};

const SUMMARY_COLUMNS: &str = "id, agent_id, conversation_id, episode_anchor, summary_text, \
     message_count, webhook_status, status_reason, webhook_attempts, webhook_last_error, \
     next_retry_at, sent_at, locked_until, created_at, updated_at";

fn summary_from_row(row: &AnyRow) -> ApiResult<SummaryJob> {
    Ok(SummaryJob {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        conversation_id: row.try_get("conversation_id")?,
        episode_anchor: get_ts(row, "episode_anchor")?,
        summary_text: get_opt(row, "summary_text"),
        message_count: row.try_get("message_count")?,
        webhook_status: get_enum(row, "webhook_status")?,
        status_reason: get_opt(row, "status_reason"),
        webhook_attempts: row.try_get("webhook_attempts")?,
        webhook_last_error: get_opt(row, "webhook_last_error"),
        next_retry_at: get_opt_ts(row, "next_retry_at")?,
        sent_at: get_opt_ts(row, "sent_at")?,
        locked_until: get_opt_ts(row, "locked_until")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

#[async_trait]
impl SummaryRepository for Database {
    async fn insert_summary_job(&self, job: &SummaryJob) -> ApiResult<bool> {
        let result = sqlx::query(
            "INSERT INTO summary_jobs (id, agent_id, conversation_id, episode_anchor, message_count,
                                       webhook_status, webhook_attempts, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(&job.id)
        .bind(job.agent_id)
        .bind(job.conversation_id)
        .bind(ts(job.episode_anchor))
        .bind(job.message_count)
        .bind(job.webhook_status.as_str())
        .bind(ts(job.created_at))
        .bind(ts(job.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_due_summaries(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> ApiResult<Vec<SummaryJob>> {
        let now_str = ts(now);
        let candidates = sqlx::query(
            "SELECT id FROM summary_jobs
             WHERE webhook_status = 'pending'
               AND (next_retry_at IS NULL OR next_retry_at <= ?)
               AND (locked_until IS NULL OR locked_until < ?)
             ORDER BY COALESCE(next_retry_at, created_at) ASC
             LIMIT ?",
        )
        .bind(&now_str)
        .bind(&now_str)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = Vec::new();
        for candidate in candidates {
            let id: String = candidate.try_get("id")?;

            let result = sqlx::query(
                "UPDATE summary_jobs
                 SET locked_until = ?, updated_at = ?
                 WHERE id = ? AND webhook_status = 'pending'
                   AND (locked_until IS NULL OR locked_until < ?)",
            )
            .bind(ts(lease_until))
            .bind(&now_str)
            .bind(&id)
            .bind(&now_str)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                continue;
            }

            if let Some(job) = self.get_summary_job(&id).await? {
                claimed.push(job);
            }
        }

        Ok(claimed)
    }

    async fn store_summary_text(&self, id: &str, text: &str, now: DateTime<Utc>) -> ApiResult<()> {
        sqlx::query("UPDATE summary_jobs SET summary_text = ?, updated_at = ? WHERE id = ?")
            .bind(text)
            .bind(ts(now))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_webhook_attempt(
        &self,
        id: &str,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> ApiResult<i64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE summary_jobs
             SET webhook_attempts = webhook_attempts + 1,
                 webhook_last_error = COALESCE(?, webhook_last_error),
                 updated_at = ?
             WHERE id = ? AND webhook_status = 'pending'",
        )
        .bind(error)
        .bind(ts(now))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(ApiError::NotFound(format!(
                "Pending summary job {} not found",
                id
            )));
        }

        let attempts: i64 = sqlx::query("SELECT webhook_attempts FROM summary_jobs WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?
            .try_get("webhook_attempts")?;

        tx.commit().await?;
        Ok(attempts)
    }

    async fn cancel_pending_summaries_for_conversation(
        &self,
        conversation_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<u64> {
        let result = sqlx::query(
            "UPDATE summary_jobs
             SET webhook_status = 'cancelled', status_reason = ?, next_retry_at = NULL,
                 locked_until = NULL, updated_at = ?
             WHERE conversation_id = ? AND webhook_status = 'pending'
               AND (locked_until IS NULL OR locked_until < ?)",
        )
        .bind(reason)
        .bind(ts(now))
        .bind(conversation_id)
        .bind(ts(now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get_summary_job(&self, id: &str) -> ApiResult<Option<SummaryJob>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM summary_jobs WHERE id = ?",
            SUMMARY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(summary_from_row).transpose()
    }

    async fn list_summary_jobs(
        &self,
        agent_id: i64,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<SummaryJob>, i64)> {
        let status = status.map(|s| s.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {} FROM summary_jobs
             WHERE agent_id = ? AND (? IS NULL OR webhook_status = ?)
             ORDER BY created_at DESC
             LIMIT ? OFFSET ?",
            SUMMARY_COLUMNS
        ))
        .bind(agent_id)
        .bind(status)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM summary_jobs
             WHERE agent_id = ? AND (? IS NULL OR webhook_status = ?)",
        )
        .bind(agent_id)
        .bind(status)
        .bind(status)
        .fetch_one(&self.pool)
        .await?
        .try_get("total")?;

        let jobs = rows
            .iter()
            .map(summary_from_row)
            .collect::<ApiResult<Vec<_>>>()?;
        Ok((jobs, total))
    }

    async fn delete_summary_job(&self, id: &str) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM summary_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
