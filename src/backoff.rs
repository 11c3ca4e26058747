use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exponential backoff schedule for failed units.
///
/// `delay = min(max_delay_ms, base_delay_ms * 2^retry_count)`, total for
/// every retry count (saturating, never panics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
    /// Ceiling in milliseconds; no delay ever exceeds this.
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
        }
    }
}

impl BackoffConfig {
    /// Delay before the next attempt, given how many attempts have failed.
    pub fn delay_for_retry(&self, retry_count: u32) -> u64 {
        let factor = 2u64.checked_pow(retry_count).unwrap_or(u64::MAX);
        self.base_delay_ms
            .checked_mul(factor)
            .unwrap_or(u64::MAX)
            .min(self.max_delay_ms)
    }

    /// Timestamp until which a unit with the given retry count must wait.
    pub fn backoff_until(&self, retry_count: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::milliseconds(self.delay_for_retry(retry_count) as i64)
    }
}

/// Whether a previously-failed unit may be attempted again.
/// An absent `backoff_until` means immediately eligible.
pub fn is_eligible(backoff_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match backoff_until {
        None => true,
        Some(until) => now >= until,
    }
}
