//! Per-job uniqueness policy
//!
//! [`UniqueJob`] is declared by producers (`across`, `timeout`, `unlock_policy`)
//! and, once admitted, carries the [`Lock`] it holds. It travels inside the job
//! payload under the `uniq` key so the worker side can release the claim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::lock::Lock;
use crate::types::{Across, UnlockPolicy};
use crate::{UniqueError, UniqueResult};

/// One week
pub const DEFAULT_TIMEOUT_SECS: u64 = 604_800;

/// Uniqueness policy for one job instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UniqueJob {
    pub across: Across,

    /// Lock lifetime in seconds
    pub timeout: u64,

    pub unlock_policy: UnlockPolicy,

    /// The claim this job holds, set once it has been admitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<Lock>,
}

impl Default for UniqueJob {
    fn default() -> Self {
        Self {
            across: Across::default(),
            timeout: DEFAULT_TIMEOUT_SECS,
            unlock_policy: UnlockPolicy::default(),
            lock: None,
        }
    }
}

/// What a producer may hand to [`UniqueJob::coerce`]
#[derive(Debug, Clone, PartialEq)]
pub enum UniqueDeclaration {
    Policy(UniqueJob),
    Value(Value),
}

impl From<UniqueJob> for UniqueDeclaration {
    fn from(policy: UniqueJob) -> Self {
        Self::Policy(policy)
    }
}

impl From<Value> for UniqueDeclaration {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Map<String, Value>> for UniqueDeclaration {
    fn from(map: Map<String, Value>) -> Self {
        Self::Value(Value::Object(map))
    }
}

impl From<bool> for UniqueDeclaration {
    fn from(flag: bool) -> Self {
        Self::Value(Value::Bool(flag))
    }
}

impl UniqueJob {
    pub fn new(across: Across, timeout: u64, unlock_policy: UnlockPolicy) -> Self {
        Self {
            across,
            timeout: normalize_timeout(timeout),
            unlock_policy,
            lock: None,
        }
    }

    pub fn with_across(mut self, across: Across) -> Self {
        self.across = across;
        self
    }

    /// Set the lock lifetime; zero falls back to [`DEFAULT_TIMEOUT_SECS`]
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = normalize_timeout(timeout);
        self
    }

    pub fn with_unlock_policy(mut self, unlock_policy: UnlockPolicy) -> Self {
        self.unlock_policy = unlock_policy;
        self
    }

    /// Validate a textual `across` value
    pub fn validate_across(value: &str) -> UniqueResult<Across> {
        value.parse()
    }

    /// Validate a textual `unlock_policy` value
    pub fn validate_unlock_policy(value: &str) -> UniqueResult<UnlockPolicy> {
        value.parse()
    }

    /// Build a policy from a producer declaration
    ///
    /// A mapping is validated into a new policy, an existing policy is returned
    /// unchanged, and anything else (null, booleans, scalars) means no policy.
    /// Keys may be written with a leading `:`.
    pub fn coerce(declaration: impl Into<UniqueDeclaration>) -> UniqueResult<Option<Self>> {
        match declaration.into() {
            UniqueDeclaration::Policy(policy) => Ok(Some(policy)),
            UniqueDeclaration::Value(Value::Object(map)) => Self::from_declaration(&map).map(Some),
            UniqueDeclaration::Value(_) => Ok(None),
        }
    }

    fn from_declaration(map: &Map<String, Value>) -> UniqueResult<Self> {
        let mut policy = Self::default();

        for (key, value) in map {
            match key.trim_start_matches(':') {
                "across" => policy.across = Self::validate_across(&enum_text("across", value)?)?,
                "unlock_policy" => {
                    policy.unlock_policy =
                        Self::validate_unlock_policy(&enum_text("unlock_policy", value)?)?
                }
                "timeout" => policy.timeout = timeout_from(value),
                "lock" => policy.lock = Lock::coerce(value),
                _ => {}
            }
        }

        Ok(policy)
    }

    /// Wire form embedded in job payloads
    pub fn to_map(&self) -> Value {
        let mut map = Map::new();
        map.insert("across".to_string(), Value::from(self.across.name()));
        map.insert("timeout".to_string(), Value::from(self.timeout));
        map.insert(
            "unlock_policy".to_string(),
            Value::from(self.unlock_policy.name()),
        );
        if let Some(lock) = &self.lock {
            map.insert("lock".to_string(), Value::Object(lock.to_map()));
        }
        Value::Object(map)
    }

    /// Rebuild a policy from its wire form
    ///
    /// Anything that does not match the wire schema exactly (missing fields,
    /// unknown keys, invalid enum names, a partial lock) yields `None`.
    pub fn from_map(value: &Value) -> Option<Self> {
        let policy: Self = serde_json::from_value(value.clone()).ok()?;
        let timeout = policy.timeout;
        Some(policy.with_timeout(timeout))
    }

    /// Absolute expiry for a claim taken at `now`
    pub fn ttl_from(&self, now: f64) -> f64 {
        now + self.timeout as f64
    }
}

fn normalize_timeout(timeout: u64) -> u64 {
    if timeout == 0 {
        DEFAULT_TIMEOUT_SECS
    } else {
        timeout
    }
}

// Non-numeric or non-positive timeouts fall back to the default
fn timeout_from(value: &Value) -> u64 {
    let seconds = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .unwrap_or(0);
    if seconds > 0 {
        seconds as u64
    } else {
        DEFAULT_TIMEOUT_SECS
    }
}

fn enum_text(field: &str, value: &Value) -> UniqueResult<String> {
    value.as_str().map(str::to_string).ok_or_else(|| {
        UniqueError::invalid_config(format!("{} is not a valid value for {}", value, field))
    })
}
