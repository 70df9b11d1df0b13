use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{AppError, Result};
use crate::ratelimit::{window_bounds, RateLimitHit, RateLimitStore};

pub struct SqliteRateLimitStore {
    pool: SqlitePool,
}

impl SqliteRateLimitStore {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

impl RateLimitStore for SqliteRateLimitStore {
    async fn increment_at(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitHit> {
        sqlx::query("DELETE FROM rate_limits WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;

        let (start, expires_at) = window_bounds(now, window);
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rate_limits (key, window_start, count, expires_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(key, window_start) DO UPDATE SET count = count + 1
            RETURNING count
            "#,
        )
        .bind(key)
        .bind(start)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        let resets_at = DateTime::from_timestamp_millis(expires_at)
            .ok_or_else(|| AppError::Validation(format!("window end {expires_at} out of range")))?;
        Ok(RateLimitHit {
            count: u32::try_from(count).unwrap_or(u32::MAX),
            resets_at,
        })
    }

    async fn reset(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM rate_limits WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite_store::tests::memory_pool;
    use chrono::TimeZone;

    #[tokio::test]
    async fn upsert_counts_within_a_window_and_purges_expired_rows() {
        let pool = memory_pool().await;
        let store = SqliteRateLimitStore::new(pool.clone());
        let window = Duration::from_secs(60);
        let t0 = Utc.timestamp_millis_opt(61_000).unwrap();

        assert_eq!(store.increment_at("claim:4", window, t0).await.unwrap().count, 1);
        let hit = store.increment_at("claim:4", window, t0).await.unwrap();
        assert_eq!(hit.count, 2);
        assert_eq!(hit.resets_at.timestamp_millis(), 120_000);

        let next = Utc.timestamp_millis_opt(130_000).unwrap();
        assert_eq!(store.increment_at("claim:4", window, next).await.unwrap().count, 1);
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rate_limits")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn reset_removes_only_that_key() {
        let pool = memory_pool().await;
        let store = SqliteRateLimitStore::new(pool);
        let window = Duration::from_secs(60);
        let now = Utc.timestamp_millis_opt(1_000).unwrap();
        store.increment_at("reprint:1", window, now).await.unwrap();
        store.increment_at("reprint:2", window, now).await.unwrap();
        store.reset("reprint:1").await.unwrap();
        assert_eq!(store.increment_at("reprint:1", window, now).await.unwrap().count, 1);
        assert_eq!(store.increment_at("reprint:2", window, now).await.unwrap().count, 2);
    }
}
