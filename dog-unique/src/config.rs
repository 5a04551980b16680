//! # Background job configuration
//!
//! [`BackgroundJobConfig`] is built once at startup and shared by producers and
//! workers. It owns one [`BackendConfig`] per supported backend, the
//! [`ObservabilityLayer`] and the [`Clock`] used for scheduling and lock expiry.
//!
//! ## Known jobs
//! Each backend keeps a table of job classes with their default options. In
//! strict mode (the default) building a job whose class is not in the table
//! fails with [`UniqueError::NotDefinedJob`].
//!
//! ```rust
//! use dog_unique::BackgroundJobConfig;
//!
//! let config = BackgroundJobConfig::new();
//! config
//!     .sidekiq()
//!     .load_jobs_json(r#"{"DummyWorker": {"queue": "mailer", "retry": 3}}"#)
//!     .unwrap();
//! assert!(config.sidekiq().job_options("DummyWorker").is_some());
//! ```
//!
//! ## Environment overrides
//! Keys follow the `PREFIX` + `BACKEND__FIELD` convention:
//!
//! ```bash
//! export BGJOB__SIDEKIQ__STRICT=false
//! export BGJOB__SIDEKIQ__NAMESPACE=myapp
//! export BGJOB__FAKTORY__UNIQUE_JOB_ACTIVE=true
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::middleware::{MiddlewareChain, WorkerChain};
use crate::observability::ObservabilityLayer;
use crate::store::{Clock, SystemClock};
use crate::types::Backend;
use crate::{UniqueError, UniqueResult};

/// Per-class job options, as found in the known-jobs table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,

    /// Backend retry setting: `true`/`false` or a count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<Value>,

    /// Uniqueness declaration applied to every job of the class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniq: Option<Value>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_retry(mut self, retry: impl Into<Value>) -> Self {
        self.retry = Some(retry.into());
        self
    }

    /// `true`, `false` or a policy mapping, as accepted by [`crate::JobMessage::unique`]
    pub fn with_uniq(mut self, uniq: impl Into<Value>) -> Self {
        self.uniq = Some(uniq.into());
        self
    }

    /// Fill unset fields from `fallback`
    pub fn or(self, fallback: &JobOptions) -> Self {
        Self {
            queue: self.queue.or_else(|| fallback.queue.clone()),
            retry: self.retry.or_else(|| fallback.retry.clone()),
            uniq: self.uniq.or_else(|| fallback.uniq.clone()),
        }
    }
}

/// Shared on/off switch for unique jobs on one backend
///
/// Handed to the producer middleware so it reads the live setting.
#[derive(Debug, Clone, Default)]
pub struct ActiveFlag(Arc<AtomicBool>);

impl ActiveFlag {
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, active: bool) {
        self.0.store(active, Ordering::Release);
    }
}

/// Settings, known jobs and middleware for one backend
pub struct BackendConfig {
    backend: Backend,
    unique_job_active: ActiveFlag,
    strict: AtomicBool,
    namespace: RwLock<Option<String>>,
    jobs: RwLock<HashMap<String, JobOptions>>,
    middleware: MiddlewareChain,
    worker_middleware: WorkerChain,
}

impl BackendConfig {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            unique_job_active: ActiveFlag::default(),
            strict: AtomicBool::new(true),
            namespace: RwLock::new(None),
            jobs: RwLock::new(HashMap::new()),
            middleware: MiddlewareChain::new(),
            worker_middleware: WorkerChain::new(),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn unique_job_active(&self) -> bool {
        self.unique_job_active.is_active()
    }

    pub fn set_unique_job_active(&self, active: bool) {
        self.unique_job_active.set(active);
    }

    pub fn active_flag(&self) -> ActiveFlag {
        self.unique_job_active.clone()
    }

    pub fn strict(&self) -> bool {
        self.strict.load(Ordering::Acquire)
    }

    pub fn set_strict(&self, strict: bool) {
        self.strict.store(strict, Ordering::Release);
    }

    /// Key prefix for the backend's own Redis keys (Sidekiq only)
    pub fn namespace(&self) -> Option<String> {
        self.namespace.read().clone()
    }

    pub fn set_namespace(&self, namespace: Option<String>) {
        *self.namespace.write() = namespace.filter(|ns| !ns.is_empty());
    }

    /// Producer interceptors run around every push
    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    /// Worker interceptors run around every fetched job
    pub fn worker_middleware(&self) -> &WorkerChain {
        &self.worker_middleware
    }

    pub fn jobs(&self) -> HashMap<String, JobOptions> {
        self.jobs.read().clone()
    }

    /// Replace the known-jobs table
    pub fn set_jobs(&self, jobs: HashMap<String, JobOptions>) {
        *self.jobs.write() = jobs;
    }

    pub fn register_job(&self, job_class: impl Into<String>, options: JobOptions) {
        self.jobs.write().insert(job_class.into(), options);
    }

    pub fn job_options(&self, job_class: &str) -> Option<JobOptions> {
        self.jobs.read().get(job_class).cloned()
    }

    /// Load the known-jobs table from a JSON document keyed by class name
    ///
    /// `{"DummyWorker": {"queue": "mailer", "retry": 3, "uniq": {"across": "queue"}}}`
    pub fn load_jobs_json(&self, document: &str) -> UniqueResult<()> {
        let jobs: HashMap<String, JobOptions> = serde_json::from_str(document).map_err(|e| {
            UniqueError::invalid_config(format!(
                "Invalid {} job definitions: {}",
                self.backend, e
            ))
        })?;
        debug!(backend = %self.backend, count = jobs.len(), "Loaded job definitions");
        self.set_jobs(jobs);
        Ok(())
    }

    /// Fail in strict mode when `job_class` is not a known job
    pub fn validate_strict_job(&self, job_class: &str) -> UniqueResult<()> {
        if self.strict() && !self.jobs.read().contains_key(job_class) {
            return Err(UniqueError::NotDefinedJob(job_class.to_string()));
        }
        Ok(())
    }

    /// Options a job gets when neither the caller nor the known-jobs table sets them
    pub fn default_options(&self) -> JobOptions {
        let retry = match self.backend {
            Backend::Sidekiq => Value::Bool(true),
            Backend::Faktory => Value::from(25),
        };
        JobOptions::new().with_queue("default").with_retry(retry)
    }

    /// Merge options: `overrides` > known-jobs table > backend defaults
    pub fn resolve_options(&self, job_class: &str, overrides: JobOptions) -> UniqueResult<JobOptions> {
        self.validate_strict_job(job_class)?;
        let known = self.job_options(job_class).unwrap_or_default();
        Ok(overrides.or(&known).or(&self.default_options()))
    }

    fn apply(&self, field: &str, value: &str) -> UniqueResult<()> {
        match field {
            "unique_job_active" => self.set_unique_job_active(parse_bool(field, value)?),
            "strict" => self.set_strict(parse_bool(field, value)?),
            "namespace" => self.set_namespace(Some(value.to_string())),
            _ => debug!(backend = %self.backend, field, "Ignoring unknown setting"),
        }
        Ok(())
    }
}

fn parse_bool(field: &str, value: &str) -> UniqueResult<bool> {
    value.trim().to_lowercase().parse::<bool>().map_err(|_| {
        UniqueError::invalid_config(format!("{:?} is not a valid value for {}", value, field))
    })
}

/// Process-wide configuration shared by producers and workers
pub struct BackgroundJobConfig {
    sidekiq: BackendConfig,
    faktory: BackendConfig,
    observability: ObservabilityLayer,
    clock: Arc<dyn Clock>,
}

impl BackgroundJobConfig {
    pub fn new() -> Self {
        Self {
            sidekiq: BackendConfig::new(Backend::Sidekiq),
            faktory: BackendConfig::new(Backend::Faktory),
            observability: ObservabilityLayer::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Read time through `clock` when building jobs
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observability(mut self, observability: ObservabilityLayer) -> Self {
        self.observability = observability;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn observability(&self) -> &ObservabilityLayer {
        &self.observability
    }

    pub fn for_backend(&self, backend: Backend) -> &BackendConfig {
        match backend {
            Backend::Sidekiq => &self.sidekiq,
            Backend::Faktory => &self.faktory,
        }
    }

    pub fn sidekiq(&self) -> &BackendConfig {
        &self.sidekiq
    }

    pub fn faktory(&self) -> &BackendConfig {
        &self.faktory
    }

    /// Apply `<PREFIX><BACKEND>__<FIELD>` overrides from the process environment
    pub fn apply_env(&self, prefix: &str) -> UniqueResult<()> {
        self.apply_vars(prefix, std::env::vars())
    }

    /// Apply overrides from `(key, value)` pairs, e.g. `BGJOB__SIDEKIQ__STRICT=false`
    ///
    /// Keys without the prefix are skipped. An unknown backend segment fails with
    /// [`UniqueError::UnsupportedBackend`].
    pub fn apply_vars<I, K, V>(&self, prefix: &str, vars: I) -> UniqueResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(stripped) = key.as_ref().strip_prefix(prefix) else {
                continue;
            };
            // SIDEKIQ__UNIQUE_JOB_ACTIVE → sidekiq.unique_job_active
            let normalized = stripped.to_lowercase().replace("__", ".");
            let Some((backend, field)) = normalized.split_once('.') else {
                continue;
            };
            let backend: Backend = backend.parse()?;
            self.for_backend(backend).apply(field, value.as_ref())?;
        }
        Ok(())
    }
}

impl Default for BackgroundJobConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_defaults() {
        let config = BackgroundJobConfig::new();
        let sidekiq = config.sidekiq();
        assert!(!sidekiq.unique_job_active());
        assert!(sidekiq.strict());
        assert_eq!(sidekiq.namespace(), None);
        assert!(sidekiq.middleware().is_empty());
        assert_eq!(
            sidekiq.default_options(),
            JobOptions::new().with_queue("default").with_retry(true)
        );
        assert_eq!(config.faktory().default_options().retry, Some(json!(25)));
    }

    #[test]
    fn test_active_flag_is_shared() {
        let config = BackgroundJobConfig::new();
        let flag = config.sidekiq().active_flag();
        config.sidekiq().set_unique_job_active(true);
        assert!(flag.is_active());
        assert!(!config.faktory().active_flag().is_active());
    }

    #[test]
    fn test_strict_mode_rejects_unknown_jobs() {
        let config = BackgroundJobConfig::new();
        let err = config.sidekiq().validate_strict_job("DummyWorker").unwrap_err();
        assert!(matches!(err, UniqueError::NotDefinedJob(ref class) if class == "DummyWorker"));
        assert!(err.to_string().contains("strict mode"));

        config.sidekiq().register_job("DummyWorker", JobOptions::new());
        assert!(config.sidekiq().validate_strict_job("DummyWorker").is_ok());

        config.sidekiq().set_strict(false);
        assert!(config.sidekiq().validate_strict_job("Other").is_ok());
    }

    #[test]
    fn test_resolve_options_precedence() {
        let config = BackgroundJobConfig::new();
        config
            .sidekiq()
            .register_job("DummyWorker", JobOptions::new().with_queue("mailer"));

        let resolved = config
            .sidekiq()
            .resolve_options("DummyWorker", JobOptions::new())
            .unwrap();
        assert_eq!(resolved, JobOptions::new().with_queue("mailer").with_retry(true));

        let resolved = config
            .sidekiq()
            .resolve_options("DummyWorker", JobOptions::new().with_queue("urgent").with_retry(2))
            .unwrap();
        assert_eq!(resolved, JobOptions::new().with_queue("urgent").with_retry(2));
    }

    #[test]
    fn test_load_jobs_json() {
        let config = BackgroundJobConfig::new();
        config
            .faktory()
            .load_jobs_json(r#"{"IndexWorker": {"queue": "indexing", "retry": false}}"#)
            .unwrap();
        assert_eq!(
            config.faktory().job_options("IndexWorker"),
            Some(JobOptions::new().with_queue("indexing").with_retry(false))
        );

        let err = config.faktory().load_jobs_json("[1, 2]").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_load_jobs_json_keeps_uniq_declaration() {
        let config = BackgroundJobConfig::new();
        config
            .sidekiq()
            .load_jobs_json(r#"{"DummyWorker": {"queue": "mailer", "uniq": {"across": "systemwide"}}}"#)
            .unwrap();
        let options = config.sidekiq().job_options("DummyWorker").unwrap();
        assert_eq!(options.uniq, Some(json!({"across": "systemwide"})));

        let resolved = config
            .sidekiq()
            .resolve_options("DummyWorker", JobOptions::new().with_uniq(false))
            .unwrap();
        assert_eq!(resolved.uniq, Some(json!(false)));
    }

    #[test]
    fn test_apply_vars() {
        let config = BackgroundJobConfig::new();
        config
            .apply_vars(
                "BGJOB__",
                vec![
                    ("BGJOB__SIDEKIQ__STRICT", "false"),
                    ("BGJOB__SIDEKIQ__NAMESPACE", "myapp"),
                    ("BGJOB__FAKTORY__UNIQUE_JOB_ACTIVE", "TRUE"),
                    ("OTHER__SIDEKIQ__STRICT", "true"),
                ],
            )
            .unwrap();
        assert!(!config.sidekiq().strict());
        assert_eq!(config.sidekiq().namespace().as_deref(), Some("myapp"));
        assert!(config.faktory().unique_job_active());

        let err = config
            .apply_vars("BGJOB__", vec![("BGJOB__RESQUE__STRICT", "true")])
            .unwrap_err();
        assert!(matches!(err, UniqueError::UnsupportedBackend { .. }));

        let err = config
            .apply_vars("BGJOB__", vec![("BGJOB__SIDEKIQ__STRICT", "maybe")])
            .unwrap_err();
        assert!(err.is_config_error());
    }
}
