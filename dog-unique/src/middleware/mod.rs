//! Producer and worker interceptor chains
//!
//! Each backend owns one [`MiddlewareChain`] run around every push and one
//! [`WorkerChain`] run around every fetched job. The unique-job interceptors
//! live in [`unique_job`].

pub mod chain;
pub mod unique_job;
pub mod worker;

pub use chain::{ClientMiddleware, MiddlewareChain, Next, PushOutcome};
pub use unique_job::{UniqueJobMiddleware, UniqueJobWorker, UNIQ_KEY};
pub use worker::{Perform, PerformFn, WorkerChain, WorkerMiddleware, WorkerNext};
