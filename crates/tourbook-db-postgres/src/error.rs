//! Error types for the PostgreSQL storage backend.

use sqlx_core::error::Error as SqlxError;
use tourbook_storage::StorageError;

/// Errors specific to the PostgreSQL storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error reported by sqlx.
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

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

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Database(e) => match e {
                SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => {
                    StorageError::connection_error(e.to_string())
                }
                other => StorageError::internal(other.to_string()),
            },
            PostgresError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_map_to_connection_errors() {
        let err: StorageError = PostgresError::Database(SqlxError::PoolTimedOut).into();
        assert!(matches!(err, StorageError::ConnectionError { .. }));
    }

    #[test]
    fn test_config_errors_map_to_internal() {
        let err: StorageError = PostgresError::config("bad table").into();
        assert_eq!(err.to_string(), "Internal error: Configuration error: bad table");
    }
}
