//! Unified storage facade for the RBAC graph.
//!
//! [`RbacStorage`] bundles the four repositories over one backend handle.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                    RbacStorage<S>                     │
//! ├─────────────┬───────────────┬─────────────┬───────────┤
//! │ EntityStore │ RelationStore │ ListingIndex│ Effective │
//! └─────────────┴───────────────┴─────────────┴───────────┘
//!                           │
//!                           ▼
//!                   StorageBackend (S)
//! ```

use rolegate_store::{MetricsSnapshot, StorageBackend, WriteOp};

use crate::{
    DEFAULT_PAGE_SIZE, EffectiveStore, EntityStore, ListingIndex, RelationStore,
    error::RepositoryResult,
};

/// Unified storage facade combining all RBAC repositories.
///
/// # Example
///
/// ```no_run
/// use rolegate_repository::RbacStorage;
/// use rolegate_store::MemoryBackend;
///
/// let storage = RbacStorage::builder()
///     .backend(MemoryBackend::new())
///     .page_size(50)
///     .build();
/// ```
#[derive(Clone)]
pub struct RbacStorage<S: StorageBackend> {
    backend: S,
    entities: EntityStore<S>,
    relations: RelationStore<S>,
    listing: ListingIndex<S>,
    effective: EffectiveStore<S>,
}

#[bon::bon]
impl<S: StorageBackend + Clone> RbacStorage<S> {
    /// Create the facade. Every repository shares a clone of `backend`.
    #[builder]
    pub fn new(backend: S, #[builder(default = DEFAULT_PAGE_SIZE)] page_size: usize) -> Self {
        let listing = ListingIndex::with_page_size(backend.clone(), page_size);
        Self {
            entities: EntityStore::with_listing(backend.clone(), listing.clone()),
            relations: RelationStore::with_page_size(backend.clone(), page_size),
            effective: EffectiveStore::new(backend.clone()),
            listing,
            backend,
        }
    }
}

impl<S: StorageBackend> RbacStorage<S> {
    pub fn entities(&self) -> &EntityStore<S> {
        &self.entities
    }

    pub fn relations(&self) -> &RelationStore<S> {
        &self.relations
    }

    pub fn listing(&self) -> &ListingIndex<S> {
        &self.listing
    }

    pub fn effective(&self) -> &EffectiveStore<S> {
        &self.effective
    }

    /// Apply a batch of writes atomically.
    pub async fn transact(&self, ops: Vec<WriteOp>) -> RepositoryResult<()> {
        self.backend.transact_write(ops).await?;
        Ok(())
    }

    pub fn metrics(&self) -> Option<MetricsSnapshot> {
        self.backend.metrics()
    }

    /// Access the underlying storage backend.
    #[inline]
    pub fn backend(&self) -> &S {
        &self.backend
    }
}
