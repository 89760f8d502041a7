//! Store error types.
//!
//! Every variant describes a transient condition of one backend. The tier chain treats all of
//! them the same way (log, count, degrade to the next tier), so the distinction exists for
//! logs and metrics only.

use std::fmt;

/// Errors that can occur inside a store adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// The backend answered, but the command failed.
    #[error("Command error: {message}")]
    CommandError {
        /// Description of the failed command.
        message: String,
    },

    /// The store is full and refused a new key.
    #[error("Store at capacity ({max_entries} entries)")]
    Capacity {
        /// Configured entry limit.
        max_entries: usize,
    },

    /// An internal store error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `CommandError` error.
    #[must_use]
    pub fn command_error(message: impl Into<String>) -> Self {
        Self::CommandError {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionError { .. } => ErrorCategory::Infrastructure,
            Self::CommandError { .. } => ErrorCategory::Command,
            Self::Capacity { .. } => ErrorCategory::Capacity,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of store errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Infrastructure/connection error.
    Infrastructure,
    /// Backend rejected a command.
    Command,
    /// Capacity limit reached.
    Capacity,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Command => write!(f, "command"),
            Self::Capacity => write!(f, "capacity"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::connection_error("refused");
        assert_eq!(err.to_string(), "Connection error: refused");

        let err = StoreError::Capacity { max_entries: 10 };
        assert_eq!(err.to_string(), "Store at capacity (10 entries)");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StoreError::connection_error("x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(StoreError::command_error("x").category(), ErrorCategory::Command);
        assert_eq!(StoreError::internal("x").category().to_string(), "internal");
    }
}
