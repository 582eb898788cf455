//! Repository error types for RBAC storage operations.
//!
//! [`RepositoryError`] wraps storage-level errors and adds the domain
//! conditions the repositories detect themselves.

use rolegate_store::StorageError;

/// Result type alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors that can occur during repository operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// The requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An entity with the same identifier already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// An identifier that cannot be encoded into a key (empty, or containing
    /// the `#` separator). Rejected before the store is touched.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Storage backend unreachable.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Transaction conflict due to concurrent modification.
    ///
    /// The operation should typically be retried.
    #[error("Conflict: concurrent modification detected")]
    Conflict,

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RepositoryError {
    /// Whether the failure came from a transient storage condition.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Conflict | Self::Timeout)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<StorageError> for RepositoryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { key } => RepositoryError::NotFound(key),
            StorageError::ConditionFailed { key } => RepositoryError::AlreadyExists(key),
            StorageError::Conflict => RepositoryError::Conflict,
            StorageError::Connection { message } => RepositoryError::Unavailable(message),
            StorageError::Serialization { message } => RepositoryError::Serialization(message),
            StorageError::Timeout => RepositoryError::Timeout,
            err @ StorageError::TransactionTooLarge { .. } => {
                RepositoryError::Validation(err.to_string())
            },
            StorageError::InvalidToken { message } => RepositoryError::Validation(message),
            StorageError::Internal { message } => RepositoryError::Internal(message),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
