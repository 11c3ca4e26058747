//! Fixed-window rate limiting for translation dispatch.
//!
//! The counter itself lives behind [`CounterStore`], an atomic
//! increment-with-expiry primitive. In production that is a remote store
//! shared by every tab and worker a user has open; [`InMemoryCounterStore`]
//! covers single-process use and tests. Decisions are computed fresh on every
//! call and never cached across ticks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter store unreachable: {0}")]
    Unreachable(String),
}

/// Counter value after an increment, with the window's reset time.
#[derive(Debug, Clone, Copy)]
pub struct WindowCount {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

/// Atomic increment-with-expiry, keyed by subject.
///
/// Implementations must make the increment atomic with respect to concurrent
/// callers on the same key; the limiter itself adds no locking.
pub trait CounterStore: Send + Sync {
    fn incr_with_expiry(
        &self,
        key: &str,
        window_secs: i64,
    ) -> impl Future<Output = Result<WindowCount, CounterError>> + Send;
}

/// Policy applied when the counter store cannot be reached.
///
/// Non-production setups default to `FailOpen`; production should configure
/// `FailClosed`. This is an explicit knob, never a hidden default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimiterPolicy {
    FailOpen,
    FailClosed,
}

/// The limiter's answer for one reservation attempt. Ephemeral, never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

pub struct RateLimiter<C> {
    store: C,
    policy: LimiterPolicy,
}

impl<C: CounterStore> RateLimiter<C> {
    pub fn new(store: C, policy: LimiterPolicy) -> Self {
        Self { store, policy }
    }

    /// Reserve one unit of budget for `subject_key`.
    ///
    /// A granted call consumes budget; a denied call reports when the window
    /// resets so the caller can poll again.
    pub async fn check_and_reserve(
        &self,
        subject_key: &str,
        limit: u32,
        window_secs: i64,
    ) -> RateLimitDecision {
        match self.store.incr_with_expiry(subject_key, window_secs).await {
            Ok(window) => {
                if window.count <= limit {
                    RateLimitDecision {
                        allowed: true,
                        remaining: limit - window.count,
                        reset_at: window.reset_at,
                    }
                } else {
                    RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_at: window.reset_at,
                    }
                }
            }
            Err(_) => {
                let reset_at = Utc::now() + Duration::seconds(window_secs);
                RateLimitDecision {
                    allowed: self.policy == LimiterPolicy::FailOpen,
                    remaining: 0,
                    reset_at,
                }
            }
        }
    }
}

/// Single-process counter store backed by a mutex-guarded map.
#[derive(Default)]
pub struct InMemoryCounterStore {
    windows: Mutex<HashMap<String, (u32, DateTime<Utc>)>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn force_expire(&self, key: &str) {
        let mut windows = self.windows.lock().expect("counter lock poisoned");
        if let Some(entry) = windows.get_mut(key) {
            entry.1 = Utc::now() - Duration::seconds(1);
        }
    }
}

impl CounterStore for InMemoryCounterStore {
    async fn incr_with_expiry(
        &self,
        key: &str,
        window_secs: i64,
    ) -> Result<WindowCount, CounterError> {
        let now = Utc::now();
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| CounterError::Unreachable("counter lock poisoned".into()))?;
        let entry = windows
            .entry(key.to_string())
            .or_insert((0, now + Duration::seconds(window_secs)));
        if now >= entry.1 {
            *entry = (0, now + Duration::seconds(window_secs));
        }
        entry.0 += 1;
        Ok(WindowCount {
            count: entry.0,
            reset_at: entry.1,
        })
    }
}
