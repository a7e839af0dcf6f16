use chrono::{DateTime, Utc};

use crate::domain::entities::JobKind;
use crate::infrastructure::http::middleware::error::ApiResult;

/// Per-conversation send accounting backing `max_per_day` and cooldowns
#[async_trait::async_trait]
pub trait SendCounterRepository: Send + Sync {
    /// Take one slot of `cap` for the day. Returns false when the cap is exhausted.
    async fn reserve_send(
        &self,
        conversation_id: i64,
        kind: JobKind,
        day: &str,
        cap: i64,
    ) -> ApiResult<bool>;

    /// Give back a slot taken by `reserve_send` when the send did not happen
    async fn release_send(&self, conversation_id: i64, kind: JobKind, day: &str) -> ApiResult<()>;

    async fn sends_on(&self, conversation_id: i64, kind: JobKind, day: &str) -> ApiResult<i64>;

    async fn record_send(
        &self,
        conversation_id: i64,
        kind: JobKind,
        at: DateTime<Utc>,
    ) -> ApiResult<()>;

    async fn last_send(&self, conversation_id: i64, kind: JobKind)
        -> ApiResult<Option<DateTime<Utc>>>;
}
