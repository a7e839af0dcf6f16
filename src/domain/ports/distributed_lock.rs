use async_trait::async_trait;

use crate::infrastructure::http::middleware::error::ApiResult;

/// Lease-based mutual exclusion shared by every engine instance.
/// Dispatches to one conversation take the lock keyed on that conversation.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Take `key` for `owner` for `ttl_seconds`. An expired lease may be taken over.
    async fn acquire(&self, key: &str, owner: &str, ttl_seconds: u64) -> ApiResult<bool>;

    /// Drop `key` if `owner` still holds it
    async fn release(&self, key: &str, owner: &str) -> ApiResult<()>;
}
