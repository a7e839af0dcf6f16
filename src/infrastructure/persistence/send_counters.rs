use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::domain::entities::JobKind;
use crate::domain::ports::send_counter_repository::SendCounterRepository;
use crate::infrastructure::http::middleware::error::ApiResult;
use crate::infrastructure::persistence::{get_opt_ts, ts, Database};

#[async_trait]
impl SendCounterRepository for Database {
    async fn reserve_send(
        &self,
        conversation_id: i64,
        kind: JobKind,
        day: &str,
        cap: i64,
    ) -> ApiResult<bool> {
        // A non-positive cap means uncapped
        if cap <= 0 {
            return Ok(true);
        }

        // Conditional increment: the update half only runs while under the cap
        let result = sqlx::query(
            "INSERT INTO send_counters (conversation_id, kind, day, count)
             VALUES (?, ?, ?, 1)
             ON CONFLICT(conversation_id, kind, day) DO UPDATE SET
                count = send_counters.count + 1
             WHERE send_counters.count < ?",
        )
        .bind(conversation_id)
        .bind(kind.as_str())
        .bind(day)
        .bind(cap)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_send(&self, conversation_id: i64, kind: JobKind, day: &str) -> ApiResult<()> {
        sqlx::query(
            "UPDATE send_counters SET count = count - 1
             WHERE conversation_id = ? AND kind = ? AND day = ? AND count > 0",
        )
        .bind(conversation_id)
        .bind(kind.as_str())
        .bind(day)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sends_on(&self, conversation_id: i64, kind: JobKind, day: &str) -> ApiResult<i64> {
        let row = sqlx::query(
            "SELECT count FROM send_counters WHERE conversation_id = ? AND kind = ? AND day = ?",
        )
        .bind(conversation_id)
        .bind(kind.as_str())
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.try_get("count")?),
            None => Ok(0),
        }
    }

    async fn record_send(
        &self,
        conversation_id: i64,
        kind: JobKind,
        at: DateTime<Utc>,
    ) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO send_cooldowns (conversation_id, kind, last_sent_at)
             VALUES (?, ?, ?)
             ON CONFLICT(conversation_id, kind) DO UPDATE SET
                last_sent_at = excluded.last_sent_at
             WHERE send_cooldowns.last_sent_at < excluded.last_sent_at",
        )
        .bind(conversation_id)
        .bind(kind.as_str())
        .bind(ts(at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last_send(
        &self,
        conversation_id: i64,
        kind: JobKind,
    ) -> ApiResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT last_sent_at FROM send_cooldowns WHERE conversation_id = ? AND kind = ?",
        )
        .bind(conversation_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => get_opt_ts(&row, "last_sent_at"),
            None => Ok(None),
        }
    }
}
