use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{AppError, Result};
use crate::ratelimit::{window_bounds, RateLimitHit, RateLimitStore};

/// (key, window_start_ms) → (count, expires_at_ms)
#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: DashMap<(String, i64), (u32, i64)>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.windows.len()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    async fn increment_at(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitHit> {
        let now_ms = now.timestamp_millis();
        self.windows.retain(|_, (_, expires_at)| *expires_at > now_ms);

        let (start, expires_at) = window_bounds(now, window);
        let count = {
            let mut entry = self
                .windows
                .entry((key.to_string(), start))
                .or_insert((0, expires_at));
            entry.0 = entry.0.saturating_add(1);
            entry.0
        };
        let resets_at = DateTime::from_timestamp_millis(expires_at)
            .ok_or_else(|| AppError::Validation(format!("window end {expires_at} out of range")))?;
        Ok(RateLimitHit { count, resets_at })
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.windows.retain(|(k, _), _| k != key);
        Ok(())
    }
}
