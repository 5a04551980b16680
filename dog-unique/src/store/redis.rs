//! Redis-backed lock store
//!
//! Each digest is a Redis sorted set (`ZADD`/`ZREM`/`ZSCORE`/`ZCOUNT`/
//! `ZREMRANGEBYSCORE`). The conditional claim relies on `ZADD ... GT`, so the
//! server must be Redis 6.2 or newer.

use std::sync::Arc;
use async_trait::async_trait;
use ::redis::aio::ConnectionManager;
use tracing::debug;

use crate::{UniqueError, UniqueResult};
use super::{Clock, LockStore, ScoreRange, SystemClock};

/// Redis lock store over a pooled, auto-reconnecting connection
///
/// A connection handle is checked out of the manager per command and dropped
/// on every exit path, error paths included.
#[derive(Clone)]
pub struct RedisLockStore {
    manager: ConnectionManager,
    clock: Arc<dyn Clock>,
}

impl RedisLockStore {
    /// Connect to Redis at `url` (e.g. "redis://127.0.0.1:6379")
    pub async fn connect(url: &str) -> UniqueResult<Self> {
        let client = ::redis::Client::open(url)
            .map_err(|e| UniqueError::Store(format!("Failed to create Redis client: {}", e)))?;
        let manager = ConnectionManager::new(client).await?;
        debug!("Connected Redis lock store");
        Ok(Self::from_manager(manager))
    }

    /// Wrap an existing connection manager supplied by the application
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self {
            manager,
            clock: Arc::new(SystemClock),
        }
    }

    /// Read time from `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

/// Render a score bound the way Redis expects it
fn score_arg(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    fn now(&self) -> f64 {
        self.clock.now()
    }

    async fn zadd_gt(&self, key: &str, member: &str, score: f64) -> UniqueResult<bool> {
        let mut conn = self.connection();
        // Without CH the reply counts only newly added members
        let added: i64 = ::redis::cmd("ZADD")
            .arg(key)
            .arg("GT")
            .arg(score_arg(score))
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(added == 1)
    }

    async fn zrem(&self, key: &str, member: &str) -> UniqueResult<bool> {
        let mut conn = self.connection();
        let removed: i64 = ::redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn zscore(&self, key: &str, member: &str) -> UniqueResult<Option<f64>> {
        let mut conn = self.connection();
        let score: Option<f64> = ::redis::cmd("ZSCORE")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(score)
    }

    async fn zrem_range_by_score(&self, key: &str, range: ScoreRange) -> UniqueResult<u64> {
        let mut conn = self.connection();
        let removed: u64 = ::redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(score_arg(range.min))
            .arg(score_arg(range.max))
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn zcount(&self, key: &str, range: ScoreRange) -> UniqueResult<u64> {
        let mut conn = self.connection();
        let count: u64 = ::redis::cmd("ZCOUNT")
            .arg(key)
            .arg(score_arg(range.min))
            .arg(score_arg(range.max))
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn del(&self, key: &str) -> UniqueResult<bool> {
        let mut conn = self.connection();
        let deleted: i64 = ::redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(deleted > 0)
    }
}
