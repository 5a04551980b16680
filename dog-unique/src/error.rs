use thiserror::Error;

/// Result type for uniqueness and enqueue operations
pub type UniqueResult<T> = Result<T, UniqueError>;

/// Errors raised by locks, policies, middleware and job builders
#[derive(Error, Debug)]
pub enum UniqueError {
    /// Invalid `across`, `unlock_policy`, digest mode or configuration document
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("UniqueJob is not supported for the `{backend}` backend. Supported options are: {supported}.")]
    UnsupportedBackend { backend: String, supported: String },

    #[error(
        "The {0:?} job is not defined and the backend is configured to work on strict mode. \
         Register it in the backend's known jobs or disable strict mode."
    )]
    NotDefinedJob(String),

    /// Transport failure from a non-Redis lock store
    #[error("Lock store error: {0}")]
    Store(String),

    /// Transport failure from Redis, carried unmodified
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Job execution failed: {0}")]
    JobFailed(#[from] JobError),
}

impl UniqueError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Check if this error is a configuration error (raised at construction or bootstrap)
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::UnsupportedBackend { .. } | Self::NotDefinedJob(_)
        )
    }
}

/// Job execution outcome reported by a worker's perform step
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Retryable error - the backend may run the job again
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Permanent error - the backend should not retry
    #[error("Permanent error: {0}")]
    Permanent(String),
}

impl JobError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for UniqueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
