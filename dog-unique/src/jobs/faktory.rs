//! Faktory payload shaping
//!
//! Payload keys: `jobtype`, `queue`, `retry`, `args`, `jid`, `created_at`,
//! `enqueued_at` and `at`. Times are sent as RFC 3339 strings with nanosecond
//! precision. The network push itself is a [`crate::jobs::JobPusher`] supplied
//! by the application.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::types::JobMessage;

/// Faktory's own default retry count
pub const DEFAULT_RETRY: i64 = 25;

/// Convert a retry option to Faktory's integer form
///
/// Numbers are truncated to integers, `false` means no retries (`-1`, straight
/// to the dead set) and anything else falls back to [`DEFAULT_RETRY`].
pub fn parse_retry(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(DEFAULT_RETRY),
        Value::Bool(false) => -1,
        _ => DEFAULT_RETRY,
    }
}

pub(crate) fn seed(job: JobMessage) -> JobMessage {
    let options = job.options().clone();
    let mut job = job;
    if let Some(queue) = options.queue {
        job = job.with_queue(queue);
    }
    job = job.with_retry(options.retry.unwrap_or(Value::Null));

    let now = job.now();
    let jobtype = Value::String(job.job_class().to_string());
    let payload = job.payload_mut();
    payload.insert("jobtype".to_string(), jobtype);
    payload
        .entry("created_at")
        .or_insert_with(|| Value::from(now));
    job
}

/// Assign a job id, stamp `enqueued_at` and render every time as RFC 3339
///
/// A scheduled `at` that is not in the future is dropped.
pub(crate) fn normalize(job: &mut JobMessage) {
    job.ensure_jid();
    let now = job.now();
    let payload = job.payload_mut();
    payload.insert("enqueued_at".to_string(), Value::from(now));

    for (field, drop_past) in [("created_at", false), ("enqueued_at", false), ("at", true)] {
        let Some(time) = payload.remove(field).as_ref().and_then(Value::as_f64) else {
            continue;
        };
        if drop_past && time <= now {
            continue;
        }
        if let Some(rendered) = rfc3339(time) {
            payload.insert(field.to_string(), Value::String(rendered));
        }
    }
}

fn rfc3339(timestamp: f64) -> Option<String> {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1_000_000_000.0).round().min(999_999_999.0) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
        .map(|time| time.to_rfc3339_opts(SecondsFormat::Nanos, false))
}
