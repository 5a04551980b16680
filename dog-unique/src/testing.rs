//! Testing mode
//!
//! [`RecordingPusher`] stands in for a real backend: pushes are kept in memory
//! so tests can assert on what would have been enqueued.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::jobs::JobPusher;
use crate::types::Backend;
use crate::UniqueResult;

/// A payload captured by [`RecordingPusher`]
#[derive(Debug, Clone, PartialEq)]
pub struct PushedJob {
    pub backend: Backend,
    pub payload: Map<String, Value>,
}

impl PushedJob {
    /// `class` for Sidekiq, `jobtype` for Faktory
    pub fn job_class(&self) -> Option<&str> {
        let key = match self.backend {
            Backend::Sidekiq => "class",
            Backend::Faktory => "jobtype",
        };
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// In-memory [`JobPusher`]; clones share the same record
#[derive(Clone, Default)]
pub struct RecordingPusher {
    jobs: Arc<RwLock<Vec<PushedJob>>>,
}

impl RecordingPusher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded push, oldest first
    pub fn jobs(&self) -> Vec<PushedJob> {
        self.jobs.read().clone()
    }

    /// Recorded pushes filtered by backend and/or job class
    pub fn jobs_for(&self, backend: Option<Backend>, job_class: Option<&str>) -> Vec<PushedJob> {
        self.jobs
            .read()
            .iter()
            .filter(|job| backend.map_or(true, |b| job.backend == b))
            .filter(|job| job_class.map_or(true, |c| job.job_class() == Some(c)))
            .cloned()
            .collect()
    }

    pub fn size(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn clear(&self) {
        self.jobs.write().clear();
    }
}

#[async_trait]
impl JobPusher for RecordingPusher {
    async fn push(&self, backend: Backend, payload: &Map<String, Value>) -> UniqueResult<()> {
        self.jobs.write().push(PushedJob {
            backend,
            payload: payload.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_jobs_for_filters() {
        let pusher = RecordingPusher::new();
        pusher
            .push(Backend::Sidekiq, &payload(json!({"class": "DummyWorker"})))
            .await
            .unwrap();
        pusher
            .push(Backend::Faktory, &payload(json!({"jobtype": "DummyWorker"})))
            .await
            .unwrap();
        pusher
            .push(Backend::Sidekiq, &payload(json!({"class": "OtherWorker"})))
            .await
            .unwrap();

        assert_eq!(pusher.size(), 3);
        assert_eq!(pusher.jobs_for(Some(Backend::Sidekiq), None).len(), 2);
        assert_eq!(pusher.jobs_for(None, Some("DummyWorker")).len(), 2);
        assert_eq!(
            pusher.jobs_for(Some(Backend::Faktory), Some("DummyWorker"))[0].job_class(),
            Some("DummyWorker")
        );
        assert!(pusher.jobs_for(Some(Backend::Faktory), Some("OtherWorker")).is_empty());

        pusher.clone().clear();
        assert_eq!(pusher.size(), 0);
        assert!(pusher.jobs().is_empty());
    }
}
