//! Storage error types

use thiserror::Error;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by a [`StorageBackend`](crate::StorageBackend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No item at the requested key.
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// A conditional write found the key already taken.
    #[error("Condition failed for key: {key}")]
    ConditionFailed { key: String },

    /// Concurrent modification; the operation may be retried.
    #[error("Conflict: concurrent modification detected")]
    Conflict,

    /// The backend could not be reached.
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Operation timed out")]
    Timeout,

    #[error("Transaction too large: {size} operations (max {max})")]
    TransactionTooLarge { size: usize, max: usize },

    /// A continuation token that this backend did not issue.
    #[error("Invalid continuation token: {message}")]
    InvalidToken { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StorageError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn condition_failed(key: impl Into<String>) -> Self {
        Self::ConditionFailed { key: key.into() }
    }

    pub fn conflict() -> Self {
        Self::Conflict
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into() }
    }

    pub fn timeout() -> Self {
        Self::Timeout
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict | Self::Connection { .. } | Self::Timeout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(StorageError::not_found("USER#u1").to_string(), "Key not found: USER#u1");
        assert_eq!(
            StorageError::TransactionTooLarge { size: 120, max: 100 }.to_string(),
            "Transaction too large: 120 operations (max 100)"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::timeout().is_transient());
        assert!(StorageError::connection("refused").is_transient());
        assert!(StorageError::conflict().is_transient());
        assert!(!StorageError::condition_failed("k").is_transient());
        assert!(!StorageError::internal("boom").is_transient());
    }
}
