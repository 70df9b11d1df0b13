//! Fixed-window counters that throttle sensitive operations per caller.

pub mod memory;
pub mod sqlite;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{AppError, Result};

pub use memory::MemoryRateLimitStore;
pub use sqlite::SqliteRateLimitStore;

/// Count for the current window after an increment, and when that window ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHit {
    pub count: u32,
    pub resets_at: DateTime<Utc>,
}

/// Window boundaries for `now`: `(window_start_ms, expires_at_ms)`.
pub fn window_bounds(now: DateTime<Utc>, window: Duration) -> (i64, i64) {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1);
    let now_ms = now.timestamp_millis();
    let start = now_ms - now_ms.rem_euclid(window_ms);
    (start, start.saturating_add(window_ms))
}

/// Atomic increments keyed by (key, window). Expired windows are purged on access.
pub trait RateLimitStore: Send + Sync + 'static {
    fn increment_at(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<RateLimitHit>> + Send;

    /// Drops every window recorded for `key`.
    fn reset(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    fn increment(
        &self,
        key: &str,
        window: Duration,
    ) -> impl Future<Output = Result<RateLimitHit>> + Send {
        self.increment_at(key, window, Utc::now())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Key prefix separating one throttled operation from another.
    pub name: &'static str,
    pub max: u32,
    pub window: Duration,
}

pub struct RateLimiter<R> {
    store: Arc<R>,
    policy: RateLimitPolicy,
}

impl<R> Clone for RateLimiter<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy,
        }
    }
}

impl<R: RateLimitStore> RateLimiter<R> {
    pub fn new(store: Arc<R>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn check(&self, identifier: &str) -> Result<RateLimitHit> {
        self.check_at(identifier, Utc::now()).await
    }

    /// Counts one attempt; fails once the window's count exceeds the policy maximum.
    pub async fn check_at(&self, identifier: &str, now: DateTime<Utc>) -> Result<RateLimitHit> {
        let key = format!("{}:{identifier}", self.policy.name);
        let hit = self.store.increment_at(&key, self.policy.window, now).await?;
        if hit.count > self.policy.max {
            let remaining_ms = (hit.resets_at - now).num_milliseconds().max(0);
            let retry_after_secs = u64::try_from((remaining_ms + 999) / 1000).unwrap_or(1).max(1);
            warn!(
                event = "RATE_LIMITED",
                policy = self.policy.name,
                identifier,
                count = hit.count,
                retry_after_secs,
                "rate limit exceeded"
            );
            return Err(AppError::RateLimited { retry_after_secs });
        }
        Ok(hit)
    }
}
