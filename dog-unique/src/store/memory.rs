use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::UniqueResult;
use super::{Clock, LockStore, ScoreRange, SystemClock};

// key -> member -> score
type SortedSets = HashMap<String, HashMap<String, f64>>;

/// In-memory lock store for testing and single-process development
///
/// Every primitive runs under one write lock, which gives the same
/// per-command atomicity Redis provides.
#[derive(Clone)]
pub struct MemoryLockStore {
    sets: Arc<RwLock<SortedSets>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store that reads time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sets: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Members of `key` with their scores, lowest score first
    pub fn members(&self, key: &str) -> Vec<(String, f64)> {
        let sets = self.sets.read();
        let mut members: Vec<(String, f64)> = sets
            .get(key)
            .map(|set| set.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        members
    }
}

impl Default for MemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    fn now(&self) -> f64 {
        self.clock.now()
    }

    async fn zadd_gt(&self, key: &str, member: &str, score: f64) -> UniqueResult<bool> {
        let mut sets = self.sets.write();
        let set = sets.entry(key.to_string()).or_default();
        match set.get_mut(member) {
            Some(current) => {
                if score > *current {
                    *current = score;
                }
                Ok(false)
            }
            None => {
                set.insert(member.to_string(), score);
                Ok(true)
            }
        }
    }

    async fn zrem(&self, key: &str, member: &str) -> UniqueResult<bool> {
        let mut sets = self.sets.write();
        let Some(set) = sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member).is_some();
        if set.is_empty() {
            sets.remove(key);
        }
        Ok(removed)
    }

    async fn zscore(&self, key: &str, member: &str) -> UniqueResult<Option<f64>> {
        Ok(self
            .sets
            .read()
            .get(key)
            .and_then(|set| set.get(member).copied()))
    }

    async fn zrem_range_by_score(&self, key: &str, range: ScoreRange) -> UniqueResult<u64> {
        let mut sets = self.sets.write();
        let Some(set) = sets.get_mut(key) else {
            return Ok(0);
        };
        let before = set.len();
        set.retain(|_, score| !range.contains(*score));
        let removed = (before - set.len()) as u64;
        if set.is_empty() {
            sets.remove(key);
        }
        Ok(removed)
    }

    async fn zcount(&self, key: &str, range: ScoreRange) -> UniqueResult<u64> {
        Ok(self
            .sets
            .read()
            .get(key)
            .map(|set| set.values().filter(|score| range.contains(**score)).count() as u64)
            .unwrap_or(0))
    }

    async fn del(&self, key: &str) -> UniqueResult<bool> {
        Ok(self.sets.write().remove(key).is_some())
    }
}
