//! Job builders and the push entry point
//!
//! ```rust
//! # tokio_test::block_on(async {
//! use dog_unique::{jobs, BackgroundJobConfig, JobOptions};
//! use dog_unique::testing::RecordingPusher;
//! use serde_json::json;
//!
//! let config = BackgroundJobConfig::new();
//! config.sidekiq().register_job("DummyWorker", JobOptions::new().with_queue("mailer"));
//!
//! let pusher = RecordingPusher::new();
//! let outcome = jobs::sidekiq(&config, "DummyWorker")
//!     .unwrap()
//!     .with_args(vec![json!(1)])
//!     .push(&config, &pusher)
//!     .await
//!     .unwrap();
//!
//! assert!(outcome.is_pushed());
//! assert_eq!(pusher.jobs_for(None, Some("DummyWorker")).len(), 1);
//! # });
//! ```

pub mod faktory;
pub mod sidekiq;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::config::{BackgroundJobConfig, JobOptions};
use crate::middleware::PushOutcome;
use crate::types::{Backend, JobMessage};
use crate::UniqueResult;

#[cfg(feature = "redis")]
pub use sidekiq::SidekiqRedisPusher;

/// Delivers a normalized payload to a backend
///
/// This is the innermost step of a producer [`crate::MiddlewareChain`].
#[async_trait]
pub trait JobPusher: Send + Sync {
    async fn push(&self, backend: Backend, payload: &Map<String, Value>) -> UniqueResult<()>;
}

/// Start a Sidekiq job for `job_class`, with options from the known-jobs table
pub fn sidekiq(config: &BackgroundJobConfig, job_class: &str) -> UniqueResult<JobMessage> {
    build(config, Backend::Sidekiq, job_class, JobOptions::default())
}

/// Start a Faktory job for `job_class`, with options from the known-jobs table
pub fn faktory(config: &BackgroundJobConfig, job_class: &str) -> UniqueResult<JobMessage> {
    build(config, Backend::Faktory, job_class, JobOptions::default())
}

/// Start a job, merging `options` over the known-jobs table and backend defaults
///
/// A `uniq` option is applied as the job's uniqueness declaration. Fails with [`crate::UniqueError::NotDefinedJob`] when the backend is strict
/// and `job_class` is not a known job.
pub fn build(
    config: &BackgroundJobConfig,
    backend: Backend,
    job_class: &str,
    options: JobOptions,
) -> UniqueResult<JobMessage> {
    let options = config
        .for_backend(backend)
        .resolve_options(job_class, options)?;
    let job = JobMessage::new(backend, job_class)
        .with_clock(config.clock())
        .with_options(options);

    let job = match backend {
        Backend::Sidekiq => sidekiq::seed(job),
        Backend::Faktory => faktory::seed(job),
    };
    let declaration = job.options().uniq.clone();
    match declaration {
        Some(declaration) => job.unique(declaration),
        None => Ok(job),
    }
}

impl JobMessage {
    /// Normalize the payload and push it through the backend's producer chain
    ///
    /// Returns [`PushOutcome::NotAdmitted`] when an interceptor (such as an
    /// active uniqueness lock) stopped the push.
    #[instrument(skip_all, fields(backend = %self.backend(), job_class = %self.job_class()))]
    pub async fn push(
        mut self,
        config: &BackgroundJobConfig,
        pusher: &dyn JobPusher,
    ) -> UniqueResult<PushOutcome> {
        let backend = self.backend();
        match backend {
            Backend::Sidekiq => sidekiq::normalize(&mut self),
            Backend::Faktory => faktory::normalize(&mut self),
        }

        let outcome = config
            .for_backend(backend)
            .middleware()
            .invoke(&mut self, backend, pusher)
            .await?;
        debug!(pushed = outcome.is_pushed(), "Push finished");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ManualClock;
    use crate::testing::RecordingPusher;
    use crate::UniqueError;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_strict_mode_requires_known_job() {
        let config = BackgroundJobConfig::new();
        let err = sidekiq(&config, "DummyWorker").unwrap_err();
        assert!(matches!(err, UniqueError::NotDefinedJob(_)));

        config.faktory().set_strict(false);
        assert!(faktory(&config, "DummyWorker").is_ok());
    }

    #[test]
    fn test_build_merges_options() {
        let config = BackgroundJobConfig::new();
        config
            .sidekiq()
            .register_job("DummyWorker", JobOptions::new().with_queue("mailer"));

        let job = build(
            &config,
            Backend::Sidekiq,
            "DummyWorker",
            JobOptions::new().with_retry(5),
        )
        .unwrap();
        assert_eq!(job.queue(), Some("mailer"));
        assert_eq!(job.payload().get("retry"), Some(&json!(5)));
    }

    #[test]
    fn test_build_applies_uniq_from_known_jobs() {
        let config = BackgroundJobConfig::new();
        config
            .faktory()
            .load_jobs_json(r#"{"IndexWorker": {"uniq": {"across": "systemwide", "timeout": 60}}}"#)
            .unwrap();

        let job = faktory(&config, "IndexWorker").unwrap();
        let policy = job.unique_job().unwrap();
        assert_eq!(policy.across, crate::Across::Systemwide);
        assert_eq!(policy.timeout, 60);

        let job = build(&config, Backend::Faktory, "IndexWorker", JobOptions::new().with_uniq(false))
            .unwrap();
        assert!(!job.is_unique_job());

        config
            .faktory()
            .register_job("IndexWorker", JobOptions::new().with_uniq(json!({"across": "invalid"})));
        assert!(faktory(&config, "IndexWorker").unwrap_err().is_config_error());
    }

    #[tokio::test]
    async fn test_push_runs_through_chain_and_records() {
        let config = BackgroundJobConfig::new().with_clock(Arc::new(ManualClock::new(100.0)));
        config.sidekiq().set_strict(false);
        let pusher = RecordingPusher::new();

        let outcome = sidekiq(&config, "DummyWorker")
            .unwrap()
            .with_jid("abc")
            .push(&config, &pusher)
            .await
            .unwrap();

        let payload = outcome.payload().unwrap();
        assert_eq!(payload.get("jid"), Some(&json!("abc")));
        assert_eq!(payload.get("enqueued_at"), Some(&json!(100.0)));
        assert_eq!(pusher.jobs_for(Some(Backend::Sidekiq), None).len(), 1);
    }
}
