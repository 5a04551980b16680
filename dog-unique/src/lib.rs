//! # dog-unique: Unique Background Jobs
//!
//! **Admission control for Sidekiq and Faktory jobs, backed by Redis locks**
//!
//! dog-unique keeps semantically duplicate jobs from being active at the same
//! time. A producer declares a uniqueness policy on a job; before the job is
//! pushed, a claim keyed by the job's class and arguments is taken in a Redis
//! sorted set. While the claim is alive, identical pushes are dropped. Workers
//! release the claim when the job starts or when it succeeds.
//!
//! ## 🎯 Features
//!
//! - **Lazy Expiry**: Claims carry an absolute TTL; stale ones are swept on the next check
//! - **Scoped Digests**: Lock per queue (`across: queue`) or per backend (`across: systemwide`)
//! - **Unlock Policies**: Release on `start`, or only on `success` so failures keep the claim
//! - **Composable Middleware**: Producer and worker interceptor chains per backend
//! - **Pluggable Stores**: Redis in production, an in-memory store for tests
//! - **Structured Observability**: Lock events and live counters, not just log lines
//!
//! ## 🚀 Quick Start
//!
//! ```rust
//! # tokio_test::block_on(async {
//! use dog_unique::prelude::*;
//! use dog_unique::testing::RecordingPusher;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let config = BackgroundJobConfig::new();
//! config.sidekiq().register_job("MailerWorker", JobOptions::new().with_queue("mailer"));
//!
//! // Redis in production: RedisLockStore::connect("redis://127.0.0.1:6379")
//! let store = Arc::new(MemoryLockStore::new());
//! UniqueJobMiddleware::bootstrap(&config, store, "sidekiq")?;
//!
//! let pusher = RecordingPusher::new();
//! let push = || async {
//!     jobs::sidekiq(&config, "MailerWorker")?
//!         .with_args(vec![json!(42)])
//!         .unique(json!({"across": "queue", "timeout": 3600}))?
//!         .push(&config, &pusher)
//!         .await
//! };
//!
//! assert!(push().await?.is_pushed());
//! assert_eq!(push().await?, PushOutcome::NotAdmitted);
//! assert_eq!(pusher.size(), 1);
//! # Ok::<(), UniqueError>(())
//! # });
//! ```

pub mod config;
pub mod error;
pub mod jobs;
pub mod lock;
pub mod middleware;
pub mod observability;
pub mod store;
pub mod testing;
pub mod types;
pub mod unique_job;

// Core API exports
pub use config::{ActiveFlag, BackendConfig, BackgroundJobConfig, JobOptions};
pub use error::{JobError, UniqueError, UniqueResult};
pub use jobs::JobPusher;
pub use lock::{Lock, LockDigest};
pub use middleware::{
    ClientMiddleware, MiddlewareChain, Next, Perform, PerformFn, PushOutcome, UniqueJobMiddleware,
    UniqueJobWorker, WorkerChain, WorkerMiddleware, WorkerNext,
};
pub use store::{Clock, LockStore, ManualClock, ScoreRange, SystemClock};
pub use types::{Across, Backend, Jid, JobMessage, UniqueEvent, UnlockPolicy, WorkerCtx};
pub use unique_job::{UniqueDeclaration, UniqueJob, DEFAULT_TIMEOUT_SECS};

// Observability exports
pub use observability::{ObservabilityLayer, UniqueMetrics};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

// Store implementations
#[cfg(feature = "memory")]
pub use store::MemoryLockStore;

#[cfg(feature = "redis")]
pub use store::RedisLockStore;

#[cfg(feature = "redis")]
pub use jobs::SidekiqRedisPusher;

/// Everything needed to declare, push and execute unique jobs
pub mod prelude {
    // Configuration and builders
    pub use crate::{jobs, BackgroundJobConfig, JobMessage, JobOptions, JobPusher, PushOutcome};

    // Uniqueness
    pub use crate::{Across, Lock, LockDigest, LockStore, UniqueJob, UniqueJobMiddleware, UnlockPolicy};

    // Worker side
    pub use crate::{Perform, WorkerCtx, WorkerMiddleware, WorkerNext};

    // Errors
    pub use crate::{Backend, JobError, UniqueError, UniqueResult};

    #[cfg(feature = "memory")]
    pub use crate::MemoryLockStore;

    #[cfg(feature = "redis")]
    pub use crate::RedisLockStore;

    // Essential traits
    pub use async_trait::async_trait;
}
