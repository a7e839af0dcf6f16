use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAt(DateTime<Utc>),
    GiveUp,
}

/// Decide what happens after a failed webhook attempt.
///
/// `attempts` already includes the attempt that just failed. The delay is constant,
/// so a job makes at most `retry_count + 1` attempts spaced `delay_secs` apart.
pub fn next_attempt(
    attempts: i64,
    retry_count: i64,
    delay_secs: i64,
    now: DateTime<Utc>,
) -> RetryDecision {
    if attempts > retry_count.max(0) {
        RetryDecision::GiveUp
    } else {
        RetryDecision::RetryAt(now + Duration::seconds(delay_secs.max(0)))
    }
}
