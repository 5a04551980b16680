use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::UniqueMetrics;
use crate::types::{Backend, UniqueEvent, UnlockPolicy};

/// Event fan-out and live counters shared by the producer and worker sides
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<UniqueEvent>,
    metrics: Arc<UniqueMetrics>,
}

impl ObservabilityLayer {
    pub fn new() -> Self {
        let (event_broadcaster, _) = broadcast::channel(10000);

        Self {
            event_broadcaster,
            metrics: Arc::new(UniqueMetrics::new()),
        }
    }

    /// Record a fresh claim that let a push through
    pub fn record_admitted(&self, backend: Backend, digest: &str, lock_id: &str, ttl: f64) {
        let event = UniqueEvent::Admitted {
            backend,
            digest: digest.to_string(),
            lock_id: lock_id.to_string(),
            ttl,
            at: Utc::now(),
        };

        let _ = self.event_broadcaster.send(event);
        self.metrics.increment_admitted(backend);
        debug!("Recorded admission: {} ({})", lock_id, digest);
    }

    /// Record a push dropped because a claim was already held
    pub fn record_suppressed(&self, backend: Backend, digest: &str, lock_id: &str) {
        let event = UniqueEvent::Suppressed {
            backend,
            digest: digest.to_string(),
            lock_id: lock_id.to_string(),
            at: Utc::now(),
        };

        let _ = self.event_broadcaster.send(event);
        self.metrics.increment_suppressed(backend);
        debug!("Recorded suppression: {} ({})", lock_id, digest);
    }

    pub fn record_released(&self, digest: &str, lock_id: &str, policy: UnlockPolicy) {
        let event = UniqueEvent::Released {
            digest: digest.to_string(),
            lock_id: lock_id.to_string(),
            policy,
            at: Utc::now(),
        };

        let _ = self.event_broadcaster.send(event);
        self.metrics.increment_released();
        debug!("Recorded release: {} ({})", lock_id, digest);
    }

    /// Record a failed job whose claim stays until it expires
    pub fn record_retained(&self, digest: &str, lock_id: &str, error: &str) {
        let event = UniqueEvent::Retained {
            digest: digest.to_string(),
            lock_id: lock_id.to_string(),
            error: error.to_string(),
            at: Utc::now(),
        };

        let _ = self.event_broadcaster.send(event);
        self.metrics.increment_retained();
        debug!("Recorded retained lock: {} ({})", lock_id, digest);
    }

    pub fn record_bypassed(&self) {
        self.metrics.increment_bypassed();
    }

    /// Get event stream
    pub fn event_stream(&self) -> broadcast::Receiver<UniqueEvent> {
        self.event_broadcaster.subscribe()
    }

    /// Get live metrics
    pub fn metrics(&self) -> &UniqueMetrics {
        &self.metrics
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let layer = ObservabilityLayer::new();
        let mut events = layer.event_stream();

        layer.record_admitted(Backend::Sidekiq, "bgjb:uniq:sidekiq:default", "abc", 10.0);
        layer.record_released("bgjb:uniq:sidekiq:default", "abc", UnlockPolicy::Start);

        let first = events.recv().await.unwrap();
        assert_eq!(first.event_name(), "admitted");
        assert_eq!(first.lock_id(), "abc");
        let second = events.recv().await.unwrap();
        assert_eq!(second.event_name(), "released");
        assert_eq!(layer.metrics().admitted(), 1);
        assert_eq!(layer.metrics().released(), 1);
    }

    #[test]
    fn test_recording_without_subscribers_still_counts() {
        let layer = ObservabilityLayer::default();
        layer.record_suppressed(Backend::Faktory, "d", "x");
        layer.record_retained("d", "x", "boom");
        assert_eq!(layer.metrics().suppressed(), 1);
        assert_eq!(layer.metrics().retained(), 1);
    }
}
