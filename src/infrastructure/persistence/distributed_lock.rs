use async_trait::async_trait;
use chrono::Utc;

use crate::domain::ports::distributed_lock::DistributedLock;
use crate::infrastructure::http::middleware::error::{ApiError, ApiResult};
use crate::infrastructure::persistence::{ts, Database};

/// Lease table shared by every engine instance pointed at the same database
#[derive(Clone)]
pub struct DatabaseDistributedLock {
    db: Database,
}

impl DatabaseDistributedLock {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DistributedLock for DatabaseDistributedLock {
    async fn acquire(&self, key: &str, owner: &str, ttl_seconds: u64) -> ApiResult<bool> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(ttl_seconds as i64);

        // A held lease is only taken over once it has expired
        let result = sqlx::query(
            "INSERT INTO distributed_locks (key, owner, expires_at, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                owner = excluded.owner,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
             WHERE distributed_locks.expires_at < ?",
        )
        .bind(key)
        .bind(owner)
        .bind(ts(expires_at))
        .bind(ts(now))
        .bind(ts(now))
        .execute(&self.db.pool)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to acquire lock {}: {}", key, e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, key: &str, owner: &str) -> ApiResult<()> {
        sqlx::query("DELETE FROM distributed_locks WHERE key = ? AND owner = ?")
            .bind(key)
            .bind(owner)
            .execute(&self.db.pool)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to release lock {}: {}", key, e)))?;
        Ok(())
    }
}
