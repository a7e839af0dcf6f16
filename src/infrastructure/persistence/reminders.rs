use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{any::AnyRow, Row};

use crate::domain::entities::{JobStatus, ReminderJob, ReminderRule};
use crate::domain::ports::reminder_repository::ReminderRepository;
use crate::infrastructure::http::middleware::error::ApiResult;
use crate::infrastructure::persistence::{get_enum, get_opt, get_opt_ts, get_ts, ts, Database};

const REMINDER_COLUMNS: &str = "id, agent_id, appointment_id, conversation_id, rule_index, rule, \
     recipient, destination, scheduled_for, status, status_reason, sent_at, error_message, \
     locked_until, created_at, updated_at";

fn reminder_from_row(row: &AnyRow) -> ApiResult<ReminderJob> {
    let rule: String = row.try_get("rule")?;
    let rule: ReminderRule = serde_json::from_str(&rule)?;

    Ok(ReminderJob {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        appointment_id: row.try_get("appointment_id")?,
        conversation_id: get_opt(row, "conversation_id"),
        rule_index: row.try_get("rule_index")?,
        rule,
        recipient: get_enum(row, "recipient")?,
        destination: row.try_get("destination")?,
        scheduled_for: get_ts(row, "scheduled_for")?,
        status: get_enum(row, "status")?,
        status_reason: get_opt(row, "status_reason"),
        sent_at: get_opt_ts(row, "sent_at")?,
        error_message: get_opt(row, "error_message"),
        locked_until: get_opt_ts(row, "locked_until")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

#[async_trait]
impl ReminderRepository for Database {
    async fn insert_reminder_job(&self, job: &ReminderJob) -> ApiResult<bool> {
        let result = sqlx::query(
            "INSERT INTO reminder_jobs (id, agent_id, appointment_id, conversation_id, rule_index, rule,
                                        recipient, destination, scheduled_for, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(&job.id)
        .bind(job.agent_id)
        .bind(job.appointment_id)
        .bind(job.conversation_id)
        .bind(job.rule_index)
        .bind(serde_json::to_string(&job.rule)?)
        .bind(job.recipient.as_str())
        .bind(&job.destination)
        .bind(ts(job.scheduled_for))
        .bind(job.status.as_str())
        .bind(ts(job.created_at))
        .bind(ts(job.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_due_reminders(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> ApiResult<Vec<ReminderJob>> {
        let now_str = ts(now);
        let candidates = sqlx::query(
            "SELECT id FROM reminder_jobs
             WHERE status = 'pending'
               AND scheduled_for <= ?
               AND (locked_until IS NULL OR locked_until < ?)
             ORDER BY scheduled_for ASC
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

            // Lose the race quietly if another worker leased it first
            let result = sqlx::query(
                "UPDATE reminder_jobs
                 SET locked_until = ?, updated_at = ?
                 WHERE id = ? AND status = 'pending'
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

            if let Some(job) = self.get_reminder_job(&id).await? {
                claimed.push(job);
            }
        }

        Ok(claimed)
    }

    async fn cancel_pending_reminders_for_appointment(
        &self,
        appointment_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<u64> {
        let result = sqlx::query(
            "UPDATE reminder_jobs
             SET status = 'cancelled', status_reason = ?, locked_until = NULL, updated_at = ?
             WHERE appointment_id = ? AND status = 'pending'
               AND (locked_until IS NULL OR locked_until < ?)",
        )
        .bind(reason)
        .bind(ts(now))
        .bind(appointment_id)
        .bind(ts(now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn cancel_pending_reminders_for_agent(
        &self,
        agent_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<u64> {
        let result = sqlx::query(
            "UPDATE reminder_jobs
             SET status = 'cancelled', status_reason = ?, locked_until = NULL, updated_at = ?
             WHERE agent_id = ? AND status = 'pending'
               AND (locked_until IS NULL OR locked_until < ?)",
        )
        .bind(reason)
        .bind(ts(now))
        .bind(agent_id)
        .bind(ts(now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get_reminder_job(&self, id: &str) -> ApiResult<Option<ReminderJob>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM reminder_jobs WHERE id = ?",
            REMINDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(reminder_from_row).transpose()
    }

    async fn list_reminder_jobs(
        &self,
        agent_id: i64,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<ReminderJob>, i64)> {
        let status = status.map(|s| s.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {} FROM reminder_jobs
             WHERE agent_id = ? AND (? IS NULL OR status = ?)
             ORDER BY scheduled_for DESC
             LIMIT ? OFFSET ?",
            REMINDER_COLUMNS
        ))
        .bind(agent_id)
        .bind(status)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM reminder_jobs
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
            .map(reminder_from_row)
            .collect::<ApiResult<Vec<_>>>()?;
        Ok((jobs, total))
    }

    async fn delete_reminder_job(&self, id: &str) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM reminder_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
