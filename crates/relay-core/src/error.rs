use std::time::Duration;

use thiserror::Error;

/// Core error types for key and record handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidResourceType error
    pub fn invalid_resource_type(resource_type: impl Into<String>) -> Self {
        Self::InvalidResourceType(resource_type.into())
    }

    /// Create a new InvalidKey error
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Failures reported by the upstream origin.
///
/// `Clone` so a single in-flight fetch can hand the same outcome to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginError {
    /// The upstream call budget is exhausted, locally or as reported by the upstream.
    #[error("Upstream rate limit exhausted")]
    RateLimited {
        /// Hint from the upstream (`Retry-After`) when one was given.
        retry_after: Option<Duration>,
    },

    /// The resource does not exist upstream.
    #[error("Resource not found upstream: {0}")]
    NotFound(String),

    /// Transport failure, timeout, unexpected status or undecodable body.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl OriginError {
    /// Creates a `RateLimited` error without a retry hint.
    #[must_use]
    pub fn rate_limited() -> Self {
        Self::RateLimited { retry_after: None }
    }

    /// Creates a new `Upstream` error.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// `NotFound` is final; everything else may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }

    /// Stable label used in logs, metrics and structured error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound(_) => "not_found",
            Self::Upstream(_) => "upstream_error",
        }
    }
}
