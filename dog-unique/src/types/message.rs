use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use super::{Backend, Jid};
use crate::config::JobOptions;
use crate::store::{Clock, SystemClock};
use crate::unique_job::{UniqueDeclaration, UniqueJob};
use crate::UniqueResult;

/// Producer-side job: class identity, resolved options and the wire payload
///
/// Built through [`crate::jobs::sidekiq`] or [`crate::jobs::faktory`], which seed the
/// backend-specific payload keys, then pushed with [`JobMessage::push`].
#[derive(Clone)]
pub struct JobMessage {
    backend: Backend,
    job_class: String,
    options: JobOptions,
    payload: Map<String, Value>,
    unique_job: Option<UniqueJob>,
    clock: Arc<dyn Clock>,
}

impl JobMessage {
    /// Create a bare job message with an empty payload
    pub fn new(backend: Backend, job_class: impl Into<String>) -> Self {
        Self {
            backend,
            job_class: job_class.into(),
            options: JobOptions::default(),
            payload: Map::new(),
            unique_job: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Read time through the given clock (scheduling and timestamps)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn job_class(&self) -> &str {
        &self.job_class
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.payload
    }

    pub fn into_payload(self) -> Map<String, Value> {
        self.payload
    }

    pub(crate) fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Target queue name, as written to the payload
    pub fn queue(&self) -> Option<&str> {
        self.payload
            .get("queue")
            .and_then(Value::as_str)
            .or(self.options.queue.as_deref())
    }

    /// Ordered job arguments (empty when none were given)
    pub fn args(&self) -> &[Value] {
        self.payload
            .get("args")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Set the job arguments
    pub fn with_args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.payload
            .insert("args".to_string(), Value::Array(args.into_iter().collect()));
        self
    }

    /// Set the target queue
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        let queue = queue.into();
        self.options.queue = Some(queue.clone());
        self.payload.insert("queue".to_string(), Value::String(queue));
        self
    }

    /// Set the backend retry option, written as-is for Sidekiq and parsed for Faktory
    pub fn with_retry(mut self, retry: Value) -> Self {
        self.options.retry = Some(retry.clone());
        let retry = match self.backend {
            Backend::Sidekiq => retry,
            Backend::Faktory => Value::from(crate::jobs::faktory::parse_retry(&retry)),
        };
        self.payload.insert("retry".to_string(), retry);
        self
    }

    /// Assign a job id unless one is already set
    pub fn with_jid(mut self, jid: impl Into<Jid>) -> Self {
        self.payload
            .entry("jid")
            .or_insert_with(|| Value::String(jid.into().0));
        self
    }

    /// Generate a job id unless one is already set
    pub fn ensure_jid(&mut self) -> &str {
        let jid = self
            .payload
            .entry("jid")
            .or_insert_with(|| Value::String(Jid::new().0));
        jid.as_str().unwrap_or_default()
    }

    pub fn jid(&self) -> Option<&str> {
        self.payload.get("jid").and_then(Value::as_str)
    }

    /// Schedule the job for an absolute time; times in the past leave it immediate
    pub fn at(self, time: DateTime<Utc>) -> Self {
        self.schedule(timestamp(time))
    }

    /// Schedule the job `seconds` from now; non-positive delays leave it immediate
    pub fn in_secs(self, seconds: f64) -> Self {
        let at = self.now() + seconds;
        self.schedule(at)
    }

    fn schedule(mut self, at: f64) -> Self {
        let now = self.now();
        if at <= now {
            return self;
        }
        self.payload.insert("at".to_string(), Value::from(at));
        self.payload.insert("created_at".to_string(), Value::from(now));
        self
    }

    pub fn created_at(mut self, time: DateTime<Utc>) -> Self {
        self.payload
            .insert("created_at".to_string(), Value::from(timestamp(time)));
        self
    }

    pub fn enqueued_at(mut self, time: DateTime<Utc>) -> Self {
        self.payload
            .insert("enqueued_at".to_string(), Value::from(timestamp(time)));
        self
    }

    /// Declare (or clear) the uniqueness policy
    ///
    /// `true` selects the default policy, `false` and scalars clear it, a mapping is
    /// coerced and validated, and an existing [`UniqueJob`] is taken as-is.
    pub fn unique(mut self, declaration: impl Into<UniqueDeclaration>) -> UniqueResult<Self> {
        self.unique_job = match declaration.into() {
            UniqueDeclaration::Value(Value::Bool(true)) => Some(UniqueJob::default()),
            other => UniqueJob::coerce(other)?,
        };
        Ok(self)
    }

    pub fn unique_job(&self) -> Option<&UniqueJob> {
        self.unique_job.as_ref()
    }

    pub fn unique_job_mut(&mut self) -> Option<&mut UniqueJob> {
        self.unique_job.as_mut()
    }

    pub fn is_unique_job(&self) -> bool {
        self.unique_job.is_some()
    }
}

/// Seconds since the epoch with microsecond precision, the payload time format
pub(crate) fn timestamp(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

impl PartialEq for JobMessage {
    fn eq(&self, other: &Self) -> bool {
        self.backend == other.backend
            && self.job_class == other.job_class
            && self.payload == other.payload
            && self.options == other.options
            && self.unique_job == other.unique_job
    }
}

impl fmt::Debug for JobMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobMessage")
            .field("backend", &self.backend)
            .field("job_class", &self.job_class)
            .field("options", &self.options)
            .field("payload", &self.payload)
            .field("unique_job", &self.unique_job)
            .finish()
    }
}

impl fmt::Display for JobMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<{} job_class={:?}", self.backend, self.job_class)?;
        if let Some(args) = self.payload.get("args") {
            write!(f, ", args={}", args)?;
        }
        if let Some(queue) = self.queue() {
            write!(f, ", queue={:?}", queue)?;
        }
        if let Some(unique_job) = &self.unique_job {
            write!(f, ", unique_job={}", unique_job.to_map())?;
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ManualClock;
    use crate::types::Across;
    use serde_json::json;

    fn job() -> JobMessage {
        JobMessage::new(Backend::Sidekiq, "DummyWorker")
            .with_clock(Arc::new(ManualClock::new(1_000.0)))
    }

    #[test]
    fn test_args_default_to_empty() {
        let job = job();
        assert!(job.args().is_empty());
        let job = job.with_args(vec![json!("User"), json!(1)]);
        assert_eq!(job.args(), &[json!("User"), json!(1)]);
    }

    #[test]
    fn test_unique_declarations() {
        let job = job().unique(true).unwrap();
        assert!(job.is_unique_job());
        assert_eq!(job.unique_job(), Some(&UniqueJob::default()));

        let job = job.unique(false).unwrap();
        assert!(!job.is_unique_job());

        let job = job.unique(json!({"across": "systemwide"})).unwrap();
        assert_eq!(job.unique_job().unwrap().across, Across::Systemwide);

        let policy = UniqueJob::default();
        let job = job.unique(policy.clone()).unwrap();
        assert_eq!(job.unique_job(), Some(&policy));

        assert!(self::job().unique(json!({"across": "invalid"})).is_err());
    }

    #[test]
    fn test_schedule_in_the_past_is_ignored() {
        let job = job().in_secs(-5.0);
        assert!(job.payload().get("at").is_none());

        let job = job.in_secs(60.0);
        assert_eq!(job.payload().get("at"), Some(&json!(1_060.0)));
        assert_eq!(job.payload().get("created_at"), Some(&json!(1_000.0)));
    }

    #[test]
    fn test_jid_is_never_overwritten() {
        let mut job = job().with_jid("first");
        assert_eq!(job.ensure_jid(), "first");
        let job = job.with_jid("second");
        assert_eq!(job.jid(), Some("first"));
    }

    #[test]
    fn test_display_includes_args_and_policy() {
        let job = job().with_args(vec![json!(1)]).unique(true).unwrap();
        let text = job.to_string();
        assert!(text.starts_with("#<sidekiq job_class=\"DummyWorker\""));
        assert!(text.contains("args=[1]"));
        assert!(text.contains("unique_job="));
    }
}
