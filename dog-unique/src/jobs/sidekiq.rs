//! Sidekiq payload shaping and the Redis pusher
//!
//! Payload keys: `class`, `queue`, `retry`, `args`, `jid`, `created_at`,
//! `enqueued_at` and, for scheduled jobs, `at` (seconds since the epoch).

use serde_json::Value;

use crate::types::JobMessage;

/// Seed the payload of a freshly built job from its resolved options
pub(crate) fn seed(job: JobMessage) -> JobMessage {
    let options = job.options().clone();
    let mut job = job;
    if let Some(queue) = options.queue {
        job = job.with_queue(queue);
    }
    if let Some(retry) = options.retry {
        job = job.with_retry(retry);
    }

    let now = job.now();
    let class = Value::String(job.job_class().to_string());
    let payload = job.payload_mut();
    payload.insert("class".to_string(), class);
    payload
        .entry("created_at")
        .or_insert_with(|| Value::from(now));
    job
}

/// Last touches before the push: a job id, and `enqueued_at` unless the job is
/// scheduled for the future
pub(crate) fn normalize(job: &mut JobMessage) {
    job.ensure_jid();
    let now = job.now();
    let payload = job.payload_mut();

    let scheduled = payload
        .get("at")
        .and_then(Value::as_f64)
        .is_some_and(|at| at > now);
    if !scheduled {
        payload.remove("at");
        payload.insert("enqueued_at".to_string(), Value::from(now));
    }
}

#[cfg(feature = "redis")]
pub use self::redis_pusher::SidekiqRedisPusher;

#[cfg(feature = "redis")]
mod redis_pusher {
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use tracing::{debug, instrument, warn};

    use crate::config::BackendConfig;
    use crate::jobs::JobPusher;
    use crate::types::Backend;
    use crate::{UniqueError, UniqueResult};

    // Failover replies worth retrying on a fresh connection
    const RETRYABLE_REPLIES: [&str; 3] = ["READONLY", "NOREPLICAS", "UNBLOCKED"];

    /// Writes jobs in the Sidekiq Redis layout
    ///
    /// Scheduled jobs go to the `schedule` sorted set scored by their `at`;
    /// immediate jobs are added to `queue:<name>` and their queue to `queues`.
    pub struct SidekiqRedisPusher {
        client: ::redis::Client,
        namespace: Option<String>,
        max_attempts: u32,
    }

    impl SidekiqRedisPusher {
        pub fn new(url: &str) -> UniqueResult<Self> {
            let client = ::redis::Client::open(url)
                .map_err(|e| UniqueError::Store(format!("Failed to create Redis client: {}", e)))?;
            Ok(Self {
                client,
                namespace: None,
                max_attempts: 3,
            })
        }

        /// Pusher keyed by the backend's configured namespace
        pub fn from_config(url: &str, config: &BackendConfig) -> UniqueResult<Self> {
            if config.backend() != Backend::Sidekiq {
                return Err(unsupported(config.backend()));
            }
            Ok(Self::new(url)?.with_namespace(config.namespace()))
        }

        pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
            self.namespace = namespace.filter(|ns| !ns.is_empty());
            self
        }

        /// Attempts per push when Redis answers with a failover error
        pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
            self.max_attempts = max_attempts.max(1);
            self
        }

        pub fn scheduled_queue_name(&self) -> String {
            self.key(&["schedule"])
        }

        pub fn queues_set_name(&self) -> String {
            self.key(&["queues"])
        }

        pub fn immediate_queue_name(&self, queue: &str) -> String {
            self.key(&["queue", queue])
        }

        fn key(&self, parts: &[&str]) -> String {
            self.namespace
                .iter()
                .map(String::as_str)
                .chain(parts.iter().copied())
                .collect::<Vec<_>>()
                .join(":")
        }

        async fn push_once(&self, payload: &Map<String, Value>) -> Result<(), ::redis::RedisError> {
            let mut conn = self.client.get_multiplexed_async_connection().await?;

            if let Some(at) = payload.get("at").and_then(Value::as_f64) {
                let mut job = payload.clone();
                job.remove("at");
                let json = Value::Object(job).to_string();
                let _: i64 = ::redis::cmd("ZADD")
                    .arg(self.scheduled_queue_name())
                    .arg(at.to_string())
                    .arg(json)
                    .query_async(&mut conn)
                    .await?;
                return Ok(());
            }

            let queue = payload
                .get("queue")
                .and_then(Value::as_str)
                .unwrap_or("default");
            let json = Value::Object(payload.clone()).to_string();
            let _: () = ::redis::pipe()
                .cmd("SADD")
                .arg(self.queues_set_name())
                .arg(queue)
                .ignore()
                .cmd("LPUSH")
                .arg(self.immediate_queue_name(queue))
                .arg(json)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok(())
        }
    }

    fn unsupported(backend: Backend) -> UniqueError {
        UniqueError::UnsupportedBackend {
            backend: backend.to_string(),
            supported: format!("`{}`", Backend::Sidekiq),
        }
    }

    fn is_retryable(err: &::redis::RedisError) -> bool {
        let message = err.to_string();
        RETRYABLE_REPLIES.iter().any(|reply| message.contains(reply))
    }

    #[async_trait]
    impl JobPusher for SidekiqRedisPusher {
        #[instrument(skip_all, fields(backend = %backend))]
        async fn push(&self, backend: Backend, payload: &Map<String, Value>) -> UniqueResult<()> {
            if backend != Backend::Sidekiq {
                return Err(unsupported(backend));
            }
            let mut attempt = 1;
            loop {
                match self.push_once(payload).await {
                    Ok(()) => {
                        debug!(attempt, "Job written to Redis");
                        return Ok(());
                    }
                    Err(err) if is_retryable(&err) && attempt < self.max_attempts => {
                        warn!(attempt, error = %err, "Redis failover reply, retrying push");
                        attempt += 1;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_key_names_follow_namespace() {
            let pusher = SidekiqRedisPusher::new("redis://127.0.0.1:6379").unwrap();
            assert_eq!(pusher.scheduled_queue_name(), "schedule");
            assert_eq!(pusher.immediate_queue_name("mailer"), "queue:mailer");

            let pusher = pusher.with_namespace(Some("myapp".to_string()));
            assert_eq!(pusher.queues_set_name(), "myapp:queues");
            assert_eq!(pusher.immediate_queue_name("mailer"), "myapp:queue:mailer");
        }

        #[test]
        fn test_from_config_reads_namespace() {
            let config = crate::BackgroundJobConfig::new();
            config
                .apply_vars("BGJOB__", vec![("BGJOB__SIDEKIQ__NAMESPACE", "myapp")])
                .unwrap();

            let pusher =
                SidekiqRedisPusher::from_config("redis://127.0.0.1:6379", config.sidekiq()).unwrap();
            assert_eq!(pusher.immediate_queue_name("mailer"), "myapp:queue:mailer");
            assert_eq!(pusher.scheduled_queue_name(), "myapp:schedule");

            let err = SidekiqRedisPusher::from_config("redis://127.0.0.1:6379", config.faktory())
                .err()
                .unwrap();
            assert!(matches!(err, UniqueError::UnsupportedBackend { .. }));
        }

        #[tokio::test]
        async fn test_rejects_faktory_payloads() {
            // Port 1 is never listened on; the check must fail before any connection
            let pusher = SidekiqRedisPusher::new("redis://127.0.0.1:1").unwrap();
            let err = pusher.push(Backend::Faktory, &Map::new()).await.unwrap_err();
            assert!(matches!(err, UniqueError::UnsupportedBackend { ref backend, .. } if backend == "faktory"));
        }

        #[test]
        fn test_failover_replies_are_retryable() {
            let err = ::redis::RedisError::from((
                ::redis::ErrorKind::ReadOnly,
                "READONLY You can't write against a read only replica.",
            ));
            assert!(is_retryable(&err));

            let err = ::redis::RedisError::from((::redis::ErrorKind::TypeError, "WRONGTYPE"));
            assert!(!is_retryable(&err));
        }
    }
}
