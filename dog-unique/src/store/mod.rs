pub mod clock;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;

use crate::UniqueResult;

pub use clock::{Clock, ManualClock, SystemClock};

#[cfg(feature = "memory")]
pub use memory::MemoryLockStore;

#[cfg(feature = "redis")]
pub use self::redis::RedisLockStore;

/// Closed score interval used for counting and sweeping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl ScoreRange {
    /// `[-inf, +inf]`
    pub fn all() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `[-inf, max]`
    pub fn up_to(max: f64) -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max,
        }
    }

    /// `[min, +inf]`
    pub fn at_least(min: f64) -> Self {
        Self {
            min,
            max: f64::INFINITY,
        }
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self::all()
    }
}

/// Sorted-set primitives the uniqueness locks are built on
///
/// One sorted set per digest; member = lock id, score = absolute expiry. Every
/// method is a single atomic operation against the store. Implementations must
/// propagate transport errors unmodified and never retry on their own.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Current time as seen by lock holders, in seconds since the epoch
    fn now(&self) -> f64;

    /// Add `member` with `score`, raising (never lowering) the score of an existing member.
    /// Returns `true` only when the member was newly added.
    async fn zadd_gt(&self, key: &str, member: &str, score: f64) -> UniqueResult<bool>;

    /// Remove `member`; returns `true` if it was present
    async fn zrem(&self, key: &str, member: &str) -> UniqueResult<bool>;

    async fn zscore(&self, key: &str, member: &str) -> UniqueResult<Option<f64>>;

    /// Remove every member whose score lies in `range`; returns how many were removed
    async fn zrem_range_by_score(&self, key: &str, range: ScoreRange) -> UniqueResult<u64>;

    async fn zcount(&self, key: &str, range: ScoreRange) -> UniqueResult<u64>;

    /// Remove the whole set; returns `true` if it existed
    async fn del(&self, key: &str) -> UniqueResult<bool>;
}
