use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    any::{AnyConnectOptions, AnyPoolOptions, AnyRow},
    AnyPool, ConnectOptions, Row,
};
use std::str::FromStr;
use tracing::log::LevelFilter;

use crate::infrastructure::http::middleware::error::{ApiError, ApiResult};

mod agents;
mod appointments;
mod conversations;
pub mod distributed_lock;
mod followups;
mod job_store;
mod reminders;
mod send_counters;
mod summaries;
mod templates;

pub use distributed_lock::DatabaseDistributedLock;

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: AnyPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        // Ensure drivers are installed for AnyPool
        sqlx::any::install_default_drivers();

        let connect_options = AnyConnectOptions::from_str(database_url)?
            .log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, std::time::Duration::from_secs(1));

        let pool = AnyPoolOptions::new()
            .max_connections(16)
            .min_connections(2)
            .connect_with(connect_options)
            .await?;

        if database_url.starts_with("sqlite") {
            sqlx::query("PRAGMA journal_mode = WAL")
                .execute(&pool)
                .await?;
            sqlx::query("PRAGMA busy_timeout = 5000")
                .execute(&pool)
                .await?;
            sqlx::query("PRAGMA synchronous = NORMAL")
                .execute(&pool)
                .await?;
            sqlx::query("PRAGMA foreign_keys = ON")
                .execute(&pool)
                .await?;
        }

        tracing::info!("Database pool ready");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("migrations/sqlite").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

/// Storage form of a timestamp: fixed-width RFC3339 UTC, so text order is time order
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(raw: &str) -> ApiResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ApiError::Internal(format!("Invalid stored timestamp '{}': {}", raw, e)))
}

pub(crate) fn get_ts(row: &AnyRow, col: &str) -> ApiResult<DateTime<Utc>> {
    let raw: String = row.try_get(col)?;
    parse_ts(&raw)
}

/// Read a nullable column. The Any driver refuses to decode SQL NULL into `Option<T>`,
/// so a failed decode reads as `None`.
pub(crate) fn get_opt<'r, T>(row: &'r AnyRow, col: &str) -> Option<T>
where
    T: sqlx::Decode<'r, sqlx::Any> + sqlx::Type<sqlx::Any>,
{
    row.try_get::<Option<T>, _>(col).ok().flatten()
}

pub(crate) fn get_opt_ts(row: &AnyRow, col: &str) -> ApiResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = get_opt(row, col);
    raw.as_deref().map(parse_ts).transpose()
}

/// Parse a stored enum column through its `FromStr`
pub(crate) fn get_enum<T>(row: &AnyRow, col: &str) -> ApiResult<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(col)?;
    raw.parse::<T>().map_err(ApiError::Internal)
}

/// `?, ?, ?` for an `IN (...)` list
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_ts_is_fixed_width_and_sortable() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::milliseconds(1500);
        assert_eq!(ts(a), "2026-01-02T03:04:05.000Z");
        assert_eq!(ts(a).len(), ts(b).len());
        assert!(ts(a) < ts(b));
        assert_eq!(parse_ts(&ts(b)).unwrap(), b);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
