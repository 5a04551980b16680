//! Uniqueness locks
//!
//! A [`Lock`] is one claim in the sorted set named by its digest: the member is
//! the job fingerprint and the score is the absolute expiry. Locks are plain
//! values; every operation is handed the [`LockStore`] to run against.

pub mod digest;
pub mod fingerprint;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::store::{LockStore, ScoreRange};
use crate::UniqueResult;

pub use digest::LockDigest;

/// A single claim against the shared store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Lock {
    pub digest: String,
    pub lock_id: String,
    /// Expiry, in seconds since the epoch
    pub ttl: f64,
}

impl Lock {
    pub fn new(digest: impl Into<String>, lock_id: impl Into<String>, ttl: f64) -> Self {
        Self {
            digest: digest.into(),
            lock_id: lock_id.into(),
            ttl,
        }
    }

    /// Rebuild a lock from its wire form
    ///
    /// Returns `None` unless the value is a mapping with exactly a string
    /// `digest`, a string `lock_id` and a numeric `ttl`.
    pub fn coerce(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("digest".to_string(), Value::String(self.digest.clone()));
        map.insert("ttl".to_string(), Value::from(self.ttl));
        map.insert("lock_id".to_string(), Value::String(self.lock_id.clone()));
        map
    }

    /// Claim the lock
    ///
    /// Returns `true` only for a fresh claim. When the member already exists its
    /// expiry is raised to `ttl` if that is later, never lowered, and `false` is
    /// returned.
    pub async fn acquire<S: LockStore + ?Sized>(&self, store: &S) -> UniqueResult<bool> {
        let acquired = store.zadd_gt(&self.digest, &self.lock_id, self.ttl).await?;
        debug!(digest = %self.digest, lock_id = %self.lock_id, acquired, "lock acquire");
        Ok(acquired)
    }

    /// Drop the claim; returns `true` if it was held
    pub async fn release<S: LockStore + ?Sized>(&self, store: &S) -> UniqueResult<bool> {
        let released = store.zrem(&self.digest, &self.lock_id).await?;
        debug!(digest = %self.digest, lock_id = %self.lock_id, released, "lock release");
        Ok(released)
    }

    /// Whether an unexpired claim for this lock id exists
    ///
    /// Expired members of the digest are swept first, so a stale claim reads as
    /// unlocked and is gone afterwards.
    pub async fn is_locked<S: LockStore + ?Sized>(&self, store: &S) -> UniqueResult<bool> {
        Self::sweep_expired(store, Some(&self.digest)).await?;
        Ok(store.zscore(&self.digest, &self.lock_id).await?.is_some())
    }

    /// Remove every member of `digest` whose expiry is at or before now
    pub async fn sweep_expired<S: LockStore + ?Sized>(
        store: &S,
        digest: Option<&str>,
    ) -> UniqueResult<u64> {
        let Some(digest) = digest.filter(|d| !d.is_empty()) else {
            return Ok(0);
        };
        store
            .zrem_range_by_score(digest, ScoreRange::up_to(store.now()))
            .await
    }

    /// Number of claims in `digest` whose expiry lies in `range` (diagnostics only)
    pub async fn count<S: LockStore + ?Sized>(
        store: &S,
        digest: &str,
        range: ScoreRange,
    ) -> UniqueResult<u64> {
        store.zcount(digest, range).await
    }

    /// Remove every claim in `digest`
    pub async fn flush_all<S: LockStore + ?Sized>(store: &S, digest: &str) -> UniqueResult<()> {
        store.del(digest).await?;
        Ok(())
    }
}
