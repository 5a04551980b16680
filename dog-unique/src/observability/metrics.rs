use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Backend;

/// Live counters for uniqueness decisions
pub struct UniqueMetrics {
    admitted: AtomicU64,
    suppressed: AtomicU64,
    released: AtomicU64,
    retained: AtomicU64,
    bypassed: AtomicU64,

    // Per-backend admission metrics
    backend_metrics: RwLock<HashMap<Backend, BackendMetrics>>,
}

impl UniqueMetrics {
    pub fn new() -> Self {
        Self {
            admitted: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            released: AtomicU64::new(0),
            retained: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
            backend_metrics: RwLock::new(HashMap::new()),
        }
    }

    pub fn increment_admitted(&self, backend: Backend) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
        self.backend_metrics.write().entry(backend).or_default().admitted += 1;
    }

    pub fn increment_suppressed(&self, backend: Backend) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
        self.backend_metrics.write().entry(backend).or_default().suppressed += 1;
    }

    pub fn increment_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retained(&self) {
        self.retained.fetch_add(1, Ordering::Relaxed);
    }

    /// A push went through without a uniqueness check
    pub fn increment_bypassed(&self) {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    pub fn retained(&self) -> u64 {
        self.retained.load(Ordering::Relaxed)
    }

    pub fn bypassed(&self) -> u64 {
        self.bypassed.load(Ordering::Relaxed)
    }

    /// Get metrics for a specific backend
    pub fn backend_metrics(&self, backend: Backend) -> BackendMetrics {
        self.backend_metrics
            .read()
            .get(&backend)
            .cloned()
            .unwrap_or_default()
    }

    /// Share of checked pushes that were dropped as duplicates, in percent
    pub fn suppression_rate(&self) -> f64 {
        let admitted = self.admitted() as f64;
        let suppressed = self.suppressed() as f64;
        let total = admitted + suppressed;

        if total == 0.0 {
            0.0
        } else {
            (suppressed / total) * 100.0
        }
    }
}

impl Default for UniqueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Admission counts for one backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendMetrics {
    pub admitted: u64,
    pub suppressed: u64,
}
