use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::Backend;

/// Execution context handed to worker middleware alongside the raw payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCtx {
    /// Backend the payload was fetched from
    pub backend: Backend,

    /// Job class (`class` for Sidekiq, `jobtype` for Faktory)
    pub job_class: Option<String>,

    /// Job id from the payload, if any
    pub jid: Option<String>,

    /// Additional tags for observability and filtering
    pub tags: HashMap<String, String>,
}

impl WorkerCtx {
    /// Create an empty context for the given backend
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            job_class: None,
            jid: None,
            tags: HashMap::new(),
        }
    }

    /// Build a context from a fetched job payload
    pub fn from_payload(backend: Backend, payload: &Map<String, Value>) -> Self {
        let class_key = match backend {
            Backend::Sidekiq => "class",
            Backend::Faktory => "jobtype",
        };
        let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            backend,
            job_class: text(class_key),
            jid: text("jid"),
            tags: HashMap::new(),
        }
    }

    /// Add a tag for observability
    pub fn with_tag(mut self, key: String, value: String) -> Self {
        self.tags.insert(key, value);
        self
    }

    /// Get a tag value by key
    pub fn get_tag(&self, key: &str) -> Option<&String> {
        self.tags.get(key)
    }
}
