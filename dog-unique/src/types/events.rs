use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Backend, UnlockPolicy};

/// Lock lifecycle events emitted by the unique-job middleware
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UniqueEvent {
    /// A fresh claim was acquired and the push went through
    Admitted {
        backend: Backend,
        digest: String,
        lock_id: String,
        ttl: f64,
        at: DateTime<Utc>,
    },

    /// An active claim already existed, the push was dropped
    Suppressed {
        backend: Backend,
        digest: String,
        lock_id: String,
        at: DateTime<Utc>,
    },

    /// A worker released the claim
    Released {
        digest: String,
        lock_id: String,
        policy: UnlockPolicy,
        at: DateTime<Utc>,
    },

    /// The job failed under `success` policy and the claim was kept until its ttl
    Retained {
        digest: String,
        lock_id: String,
        error: String,
        at: DateTime<Utc>,
    },
}

impl UniqueEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Admitted { .. } => "admitted",
            Self::Suppressed { .. } => "suppressed",
            Self::Released { .. } => "released",
            Self::Retained { .. } => "retained",
        }
    }

    /// Get the lock digest from any event
    pub fn digest(&self) -> &str {
        match self {
            Self::Admitted { digest, .. }
            | Self::Suppressed { digest, .. }
            | Self::Released { digest, .. }
            | Self::Retained { digest, .. } => digest,
        }
    }

    /// Get the lock id from any event
    pub fn lock_id(&self) -> &str {
        match self {
            Self::Admitted { lock_id, .. }
            | Self::Suppressed { lock_id, .. }
            | Self::Released { lock_id, .. }
            | Self::Retained { lock_id, .. } => lock_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Admitted { at, .. }
            | Self::Suppressed { at, .. }
            | Self::Released { at, .. }
            | Self::Retained { at, .. } => at,
        }
    }
}
