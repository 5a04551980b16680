//! Unique-job admission control and release
//!
//! [`UniqueJobMiddleware`] runs in a backend's producer chain and drops a push
//! while an unexpired claim for the same job class, arguments and scope exists.
//! [`UniqueJobWorker`] runs in the backend's worker chain and releases the claim
//! embedded in the payload, before or after the job body depending on the
//! job's unlock policy.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{ClientMiddleware, Next, PushOutcome, WorkerMiddleware, WorkerNext};
use crate::config::{ActiveFlag, BackgroundJobConfig};
use crate::lock::{fingerprint, Lock, LockDigest};
use crate::observability::ObservabilityLayer;
use crate::store::LockStore;
use crate::types::{Backend, JobMessage, UnlockPolicy, WorkerCtx};
use crate::unique_job::UniqueJob;
use crate::UniqueResult;

/// Payload key carrying the serialized [`UniqueJob`]
pub const UNIQ_KEY: &str = "uniq";

/// Producer-side admission control
pub struct UniqueJobMiddleware {
    store: Arc<dyn LockStore>,
    active: ActiveFlag,
    observability: ObservabilityLayer,
}

impl UniqueJobMiddleware {
    pub fn new(
        store: Arc<dyn LockStore>,
        active: ActiveFlag,
        observability: ObservabilityLayer,
    ) -> Self {
        Self {
            store,
            active,
            observability,
        }
    }

    /// Enable unique jobs for the backend named `backend`
    ///
    /// Installs [`UniqueJobWorker`] into the backend's worker chain, turns the
    /// backend's `unique_job_active` flag on and registers this middleware in its
    /// producer chain. Calling it again for the same backend replaces the
    /// installed interceptors instead of stacking them.
    pub fn bootstrap(
        config: &BackgroundJobConfig,
        store: Arc<dyn LockStore>,
        backend: &str,
    ) -> UniqueResult<Backend> {
        let backend: Backend = backend.parse()?;
        let backend_config = config.for_backend(backend);
        let observability = config.observability().clone();

        backend_config
            .worker_middleware()
            .add(UniqueJobWorker::new(store.clone(), observability.clone()));
        backend_config.set_unique_job_active(true);
        backend_config.middleware().add(Self::new(
            store,
            backend_config.active_flag(),
            observability,
        ));

        info!(backend = %backend, "Unique jobs enabled");
        Ok(backend)
    }

    /// The claim `job` would take, or `None` when it declares no policy
    pub fn lock_for(&self, job: &JobMessage, backend: Backend) -> UniqueResult<Option<Lock>> {
        let Some(policy) = job.unique_job() else {
            return Ok(None);
        };

        let mut segments = vec![backend.as_str()];
        if let Some(queue) = job.queue() {
            segments.push(queue);
        }
        let digest = LockDigest::for_scope(&segments, policy.across);
        let lock_id = fingerprint::lock_id(job.job_class(), job.args())?;
        let ttl = policy.ttl_from(self.store.now());

        Ok(Some(Lock::new(digest, lock_id, ttl)))
    }
}

#[async_trait]
impl ClientMiddleware for UniqueJobMiddleware {
    #[instrument(skip_all, fields(backend = %backend, job_class = %job.job_class()))]
    async fn call(
        &self,
        job: &mut JobMessage,
        backend: Backend,
        next: Next<'_>,
    ) -> UniqueResult<PushOutcome> {
        if !self.active.is_active() {
            self.observability.record_bypassed();
            return next.run(job, backend).await;
        }

        let Some(lock) = self.lock_for(job, backend)? else {
            self.observability.record_bypassed();
            return next.run(job, backend).await;
        };

        let store = self.store.as_ref();
        if lock.is_locked(store).await? {
            debug!(digest = %lock.digest, lock_id = %lock.lock_id, "Active lock, push dropped");
            self.observability
                .record_suppressed(backend, &lock.digest, &lock.lock_id);
            return Ok(PushOutcome::NotAdmitted);
        }

        // Another producer may have claimed it since the check
        if !lock.acquire(store).await? {
            warn!(digest = %lock.digest, lock_id = %lock.lock_id, "Lost lock race, push dropped");
            self.observability
                .record_suppressed(backend, &lock.digest, &lock.lock_id);
            return Ok(PushOutcome::NotAdmitted);
        }

        if let Some(policy) = job.unique_job_mut() {
            policy.lock = Some(lock.clone());
            let envelope = policy.to_map();
            job.payload_mut().insert(UNIQ_KEY.to_string(), envelope);
        }
        self.observability
            .record_admitted(backend, &lock.digest, &lock.lock_id, lock.ttl);
        debug!(digest = %lock.digest, lock_id = %lock.lock_id, ttl = lock.ttl, "Lock acquired");

        next.run(job, backend).await
    }
}

/// Worker-side release of the claim carried in the payload
pub struct UniqueJobWorker {
    store: Arc<dyn LockStore>,
    observability: ObservabilityLayer,
}

impl UniqueJobWorker {
    pub fn new(store: Arc<dyn LockStore>, observability: ObservabilityLayer) -> Self {
        Self {
            store,
            observability,
        }
    }

    // A missing or malformed envelope means there is nothing to release
    fn unique_job(payload: &Map<String, Value>) -> Option<(UniqueJob, Lock)> {
        let envelope = payload.get(UNIQ_KEY)?;
        if !envelope.is_object() {
            return None;
        }
        let mut policy = UniqueJob::from_map(envelope)?;
        let lock = policy.lock.take()?;
        Some((policy, lock))
    }

    async fn release(&self, lock: &Lock, policy: UnlockPolicy) -> UniqueResult<()> {
        let released = lock.release(self.store.as_ref()).await?;
        if released {
            self.observability
                .record_released(&lock.digest, &lock.lock_id, policy);
        }
        debug!(digest = %lock.digest, lock_id = %lock.lock_id, released, policy = %policy, "Lock release");
        Ok(())
    }
}

#[async_trait]
impl WorkerMiddleware for UniqueJobWorker {
    #[instrument(skip_all, fields(backend = %ctx.backend, queue = %queue))]
    async fn call(
        &self,
        ctx: &WorkerCtx,
        payload: &Map<String, Value>,
        queue: &str,
        next: WorkerNext<'_>,
    ) -> UniqueResult<()> {
        let Some((policy, lock)) = Self::unique_job(payload) else {
            return next.run(ctx, payload, queue).await;
        };

        match policy.unlock_policy {
            UnlockPolicy::Start => {
                self.release(&lock, UnlockPolicy::Start).await?;
                next.run(ctx, payload, queue).await
            }
            UnlockPolicy::Success => match next.run(ctx, payload, queue).await {
                Ok(()) => self.release(&lock, UnlockPolicy::Success).await,
                Err(err) => {
                    warn!(
                        digest = %lock.digest,
                        lock_id = %lock.lock_id,
                        error = %err,
                        "Job failed, lock kept until it expires"
                    );
                    self.observability
                        .record_retained(&lock.digest, &lock.lock_id, &err.to_string());
                    Err(err)
                }
            },
        }
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::middleware::PerformFn;
    use crate::store::{ManualClock, MemoryLockStore, ScoreRange};
    use crate::testing::RecordingPusher;
    use crate::types::Across;
    use crate::{JobError, UniqueError};
    use serde_json::json;

    const NOW: f64 = 1_593_693_050.0;
    const HOUR: u64 = 3_600;

    struct Setup {
        clock: Arc<ManualClock>,
        store: Arc<MemoryLockStore>,
        config: BackgroundJobConfig,
        pusher: RecordingPusher,
    }

    fn setup() -> Setup {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = Arc::new(MemoryLockStore::with_clock(clock.clone()));
        let config = BackgroundJobConfig::new().with_clock(clock.clone());
        config.sidekiq().set_strict(false);
        UniqueJobMiddleware::bootstrap(&config, store.clone(), "sidekiq").unwrap();
        Setup {
            clock,
            store,
            config,
            pusher: RecordingPusher::new(),
        }
    }

    fn job(config: &BackgroundJobConfig, across: Across) -> JobMessage {
        crate::jobs::sidekiq(config, "DummyWorker")
            .unwrap()
            .with_queue("mailer")
            .unique(UniqueJob::default().with_across(across).with_timeout(HOUR))
            .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_installs_both_sides() {
        let s = setup();
        let sidekiq = s.config.sidekiq();
        assert!(sidekiq.unique_job_active());
        assert!(sidekiq.middleware().exists::<UniqueJobMiddleware>());
        assert!(sidekiq.worker_middleware().exists::<UniqueJobWorker>());
        assert!(!s.config.faktory().unique_job_active());

        UniqueJobMiddleware::bootstrap(&s.config, s.store.clone(), "sidekiq").unwrap();
        assert_eq!(sidekiq.middleware().len(), 1);
        assert_eq!(sidekiq.worker_middleware().len(), 1);
    }

    #[test]
    fn test_bootstrap_rejects_unknown_backend() {
        let config = BackgroundJobConfig::new();
        let err =
            UniqueJobMiddleware::bootstrap(&config, Arc::new(MemoryLockStore::new()), "invalid")
                .unwrap_err();
        assert!(matches!(err, UniqueError::UnsupportedBackend { .. }));
        assert!(err.to_string().contains("`sidekiq`, `faktory`"));
    }

    #[tokio::test]
    async fn test_lock_for_scopes_digest_by_across() {
        let s = setup();
        let middleware = UniqueJobMiddleware::new(
            s.store.clone(),
            s.config.sidekiq().active_flag(),
            ObservabilityLayer::new(),
        );

        let queue_lock = middleware
            .lock_for(&job(&s.config, Across::Queue), Backend::Sidekiq)
            .unwrap()
            .unwrap();
        assert_eq!(queue_lock.digest, "bgjb:uniq:sidekiq:mailer");
        assert_eq!(queue_lock.lock_id, fingerprint::lock_id("DummyWorker", &[]).unwrap());
        assert_eq!(queue_lock.ttl, NOW + HOUR as f64);

        let systemwide = middleware
            .lock_for(&job(&s.config, Across::Systemwide), Backend::Sidekiq)
            .unwrap()
            .unwrap();
        assert_eq!(systemwide.digest, "bgjb:uniq:sidekiq");

        let plain = crate::jobs::sidekiq(&s.config, "DummyWorker").unwrap();
        assert_eq!(middleware.lock_for(&plain, Backend::Sidekiq).unwrap(), None);
    }

    #[tokio::test]
    async fn test_active_lock_suppresses_push_and_sweeps_stale_claims() {
        let s = setup();
        let digest = "bgjb:uniq:sidekiq:mailer";
        let lock_id = fingerprint::lock_id("DummyWorker", &[]).unwrap();
        s.store.zadd_gt(digest, &lock_id, NOW + 1.0).await.unwrap();
        s.store.zadd_gt(digest, "123", NOW - 2.0).await.unwrap();
        s.store.zadd_gt(digest, "456", NOW - 1.0).await.unwrap();

        let outcome = job(&s.config, Across::Queue)
            .push(&s.config, &s.pusher)
            .await
            .unwrap();
        assert_eq!(outcome, PushOutcome::NotAdmitted);
        assert_eq!(s.pusher.size(), 0);
        assert_eq!(s.store.members(digest), vec![(lock_id, NOW + 1.0)]);
        assert_eq!(s.config.observability().metrics().suppressed(), 1);
    }

    #[tokio::test]
    async fn test_admitted_push_embeds_lock() {
        let s = setup();
        let outcome = job(&s.config, Across::Queue)
            .push(&s.config, &s.pusher)
            .await
            .unwrap();

        let payload = outcome.payload().unwrap();
        let lock_id = fingerprint::lock_id("DummyWorker", &[]).unwrap();
        assert_eq!(
            payload.get(UNIQ_KEY),
            Some(&json!({
                "across": "queue",
                "timeout": 3_600,
                "unlock_policy": "success",
                "lock": {
                    "digest": "bgjb:uniq:sidekiq:mailer",
                    "lock_id": lock_id,
                    "ttl": NOW + 3_600.0,
                },
            }))
        );
        assert_eq!(
            s.store.zscore("bgjb:uniq:sidekiq:mailer", &lock_id).await.unwrap(),
            Some(NOW + 3_600.0)
        );
        assert_eq!(s.pusher.size(), 1);
    }

    #[tokio::test]
    async fn test_inactive_backend_bypasses_checks() {
        let s = setup();
        s.config.sidekiq().set_unique_job_active(false);

        job(&s.config, Across::Queue).push(&s.config, &s.pusher).await.unwrap();
        job(&s.config, Across::Queue).push(&s.config, &s.pusher).await.unwrap();
        assert_eq!(s.pusher.size(), 2);
        assert!(s.store.members("bgjb:uniq:sidekiq:mailer").is_empty());
        assert_eq!(s.config.observability().metrics().bypassed(), 2);
    }

    #[tokio::test]
    async fn test_worker_releases_after_success() {
        let s = setup();
        let outcome = job(&s.config, Across::Queue)
            .push(&s.config, &s.pusher)
            .await
            .unwrap();
        let payload = outcome.payload().unwrap().clone();
        let ctx = WorkerCtx::from_payload(Backend::Sidekiq, &payload);
        let perform = PerformFn(|_: &WorkerCtx, _: &Map<String, Value>| -> Result<(), JobError> { Ok(()) });

        s.config
            .sidekiq()
            .worker_middleware()
            .invoke(&ctx, &payload, "mailer", &perform)
            .await
            .unwrap();
        assert_eq!(
            Lock::count(s.store.as_ref(), "bgjb:uniq:sidekiq:mailer", ScoreRange::all())
                .await
                .unwrap(),
            0
        );
        assert_eq!(s.config.observability().metrics().released(), 1);
    }

    #[tokio::test]
    async fn test_worker_ignores_malformed_envelope() {
        let s = setup();
        let payload = json!({"class": "DummyWorker", "uniq": {"across": "queue"}})
            .as_object()
            .cloned()
            .unwrap();
        let ctx = WorkerCtx::from_payload(Backend::Sidekiq, &payload);
        let perform = PerformFn(|_: &WorkerCtx, _: &Map<String, Value>| -> Result<(), JobError> { Ok(()) });

        s.config
            .sidekiq()
            .worker_middleware()
            .invoke(&ctx, &payload, "mailer", &perform)
            .await
            .unwrap();
        assert_eq!(s.config.observability().metrics().released(), 0);
    }

    #[tokio::test]
    async fn test_expired_lock_readmits() {
        let s = setup();
        assert!(job(&s.config, Across::Queue).push(&s.config, &s.pusher).await.unwrap().is_pushed());
        assert!(!job(&s.config, Across::Queue).push(&s.config, &s.pusher).await.unwrap().is_pushed());

        s.clock.advance(HOUR as f64 + 1.0);
        assert!(job(&s.config, Across::Queue).push(&s.config, &s.pusher).await.unwrap().is_pushed());
        assert_eq!(s.pusher.size(), 2);
    }
}
