//! # Rolegate Core - Permission Resolution
//!
//! Answers "does user U hold permission P?" over the RBAC graph kept by
//! `rolegate-repository`, and hosts the management surface around it.
//!
//! - [`Resolver`]: user → roles → permissions, with per-role fan-out
//! - [`RbacService`]: create, assign, query and delete operations
//! - [`cascade`]: deleting an entity together with its incident edges
//! - [`maintenance`]: background recompute of effective permissions and
//!   deferred cascade sweeps
//!
//! All operations take a [`CallContext`] for cancellation and deadlines.

#![deny(unsafe_code)]

use std::sync::Arc;

use rolegate_repository::{RbacStorage, RepositoryError};
use rolegate_store::StorageBackend;
use thiserror::Error;

pub mod cascade;
pub mod context;
pub mod fanout;
pub mod maintenance;
pub mod resolver;
pub mod service;

pub use cascade::{Cascade, DeleteOutcome};
pub use context::CallContext;
pub use fanout::RoleFanout;
pub use maintenance::{MaintenanceHandle, MaintenanceTask, MaintenanceWorker, Recomputer};
pub use resolver::Resolver;
pub use service::RbacService;

/// Storage facade over a type-erased backend, as shared by every component
/// of this crate.
pub type SharedStorage = RbacStorage<Arc<dyn StorageBackend>>;

/// Wrap any backend into a [`SharedStorage`].
pub fn shared_storage<B: StorageBackend + 'static>(backend: B, page_size: usize) -> SharedStorage {
    let backend: Arc<dyn StorageBackend> = Arc::new(backend);
    RbacStorage::builder().backend(backend).page_size(page_size).build()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Permission not found: {0}")]
    PermissionNotFound(String),

    /// A create whose write may or may not have landed. Read back before
    /// trying again.
    #[error("Outcome unknown: {0}")]
    Indeterminate(RepositoryError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether repeating the same call could succeed.
    ///
    /// Only transient store failures qualify. Creates never report them as
    /// such: they surface as [`CoreError::Indeterminate`] instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Repository(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether the error reports a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::UserNotFound(_)
                | CoreError::RoleNotFound(_)
                | CoreError::PermissionNotFound(_)
                | CoreError::Repository(RepositoryError::NotFound(_))
        )
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
