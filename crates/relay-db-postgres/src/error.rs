//! Error types for the PostgreSQL cache tier.

use relay_storage::StoreError;
use sqlx_core::error::Error as SqlxError;

/// Errors specific to the PostgreSQL cache tier.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Database(e) => match e {
                SqlxError::Database(db) => StoreError::command_error(db.to_string()),
                SqlxError::RowNotFound | SqlxError::ColumnDecode { .. } | SqlxError::Decode(_) => {
                    StoreError::internal(e.to_string())
                }
                other => StoreError::connection_error(other.to_string()),
            },
            PostgresError::Migration(e) => StoreError::internal(format!("Migration error: {e}")),
            PostgresError::Config { message } => {
                StoreError::internal(format!("Configuration error: {message}"))
            }
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
