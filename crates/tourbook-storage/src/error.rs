//! Storage error types for the record store abstraction.

use std::fmt;

use crate::types::RecordId;

/// Errors that can occur during record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("Record not found: {id}")]
    NotFound {
        /// The ID of the record that was not found.
        id: RecordId,
    },

    /// The patch or stored data is invalid.
    #[error("Invalid record: {message}")]
    InvalidRecord {
        /// Description of why the record is invalid.
        message: String,
    },

    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(id: RecordId) -> Self {
        Self::NotFound { id }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
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

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::InvalidRecord { .. } => ErrorCategory::Validation,
            Self::ConnectionError { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Validation error.
    Validation,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
