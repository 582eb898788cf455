//! Cascading delete.
//!
//! Deleting an entity removes its metadata record and every incident edge in
//! both directions (plus a user's effective-permission record). When all of
//! that fits in one transaction it is committed atomically. Otherwise the
//! metadata record goes first and the edges are removed by a sweep, either
//! queued on the maintenance worker or run inline when none is available.
//!
//! A sweep re-reads the incident edges each time it runs and deletes what it
//! finds, so running it twice, or after a crash halfway through, is safe.

use rolegate_observe::metrics;
use rolegate_repository::keys;
use rolegate_store::{MAX_TRANSACTION_ITEMS, WriteOp};
use rolegate_types::EntityKind;
use tracing::{debug, info};

use crate::{
    CoreResult, SharedStorage,
    maintenance::{MaintenanceHandle, MaintenanceTask},
};

/// Default number of edge deletes per sweep transaction.
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 25;

/// What a delete did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Metadata and every incident edge are gone.
    Completed { edges_removed: usize },
    /// Metadata is gone; a sweep for `pending_edges` edges is queued.
    Deferred { pending_edges: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct Cascade {
    max_transaction_items: usize,
    sweep_batch_size: usize,
}

impl Default for Cascade {
    fn default() -> Self {
        Self::new(MAX_TRANSACTION_ITEMS, DEFAULT_SWEEP_BATCH_SIZE)
    }
}

impl Cascade {
    /// Both limits are clamped to `1..=MAX_TRANSACTION_ITEMS`.
    pub fn new(max_transaction_items: usize, sweep_batch_size: usize) -> Self {
        Self {
            max_transaction_items: max_transaction_items.clamp(1, MAX_TRANSACTION_ITEMS),
            sweep_batch_size: sweep_batch_size.clamp(1, MAX_TRANSACTION_ITEMS),
        }
    }

    pub fn max_transaction_items(&self) -> usize {
        self.max_transaction_items
    }

    pub fn sweep_batch_size(&self) -> usize {
        self.sweep_batch_size
    }

    /// Delete `(kind, id)` and its incident edges.
    ///
    /// Roles and permissions too large for one transaction are deferred to
    /// the maintenance queue when one is given. Users never are.
    ///
    /// The caller has already checked that the entity exists.
    pub async fn delete(
        &self,
        storage: &SharedStorage,
        kind: EntityKind,
        id: &str,
        maintenance: Option<&MaintenanceHandle>,
    ) -> CoreResult<DeleteOutcome> {
        let edges = storage.relations().incident_keys(kind, id).await?;
        let edge_count = edges.len();

        let mut ops = Vec::with_capacity(edge_count + 2);
        ops.push(WriteOp::Delete(keys::metadata::encode(kind, id)?));
        if kind == EntityKind::User {
            ops.push(storage.effective().delete_op(id)?);
        }
        ops.extend(edges.into_iter().map(WriteOp::Delete));

        if ops.len() <= self.max_transaction_items {
            storage.transact(ops).await?;
            metrics::record_cascade_delete(kind.as_str(), "transaction", edge_count);
            debug!(%kind, id, edges = edge_count, "Deleted entity in one transaction");
            return Ok(DeleteOutcome::Completed { edges_removed: edge_count });
        }

        storage.entities().remove(kind, id).await?;

        // A user's edges all live in its own partition and are bounded by the
        // roles it holds, so they are always swept before returning.
        if kind != EntityKind::User
            && let Some(handle) = maintenance
            && handle.try_enqueue(MaintenanceTask::Sweep { kind, id: id.to_string() })
        {
            metrics::record_cascade_delete(kind.as_str(), "deferred", 0);
            info!(%kind, id, pending = edge_count, "Deleted metadata, edge sweep queued");
            return Ok(DeleteOutcome::Deferred { pending_edges: edge_count });
        }

        let removed = self.sweep(storage, kind, id).await?;
        metrics::record_cascade_delete(kind.as_str(), "inline_sweep", removed);
        Ok(DeleteOutcome::Completed { edges_removed: removed })
    }

    /// Delete every remaining incident edge of `(kind, id)` in batches.
    ///
    /// Returns the number of edges deleted by this run.
    pub async fn sweep(
        &self,
        storage: &SharedStorage,
        kind: EntityKind,
        id: &str,
    ) -> CoreResult<usize> {
        let edges = storage.relations().incident_keys(kind, id).await?;
        for batch in edges.chunks(self.sweep_batch_size) {
            storage.transact(batch.iter().cloned().map(WriteOp::Delete).collect()).await?;
        }
        if kind == EntityKind::User {
            storage.effective().delete(id).await?;
        }
        debug!(%kind, id, edges = edges.len(), "Swept incident edges");
        Ok(edges.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rolegate_store::{MemoryBackend, StorageBackend};
    use rolegate_types::{EdgeKind, Role};

    use super::*;
    use crate::shared_storage;

    async fn role_with_members(storage: &SharedStorage, members: usize) -> String {
        let role = storage.entities().create(Role::new("Admin", "")).await.unwrap();
        let role_id = role.id.as_str().to_string();
        for i in 0..members {
            storage
                .relations()
                .assign(EdgeKind::UserRole, &format!("u{}", i), &role_id)
                .await
                .unwrap();
        }
        storage.relations().assign(EdgeKind::RolePermission, &role_id, "doc.read").await.unwrap();
        role_id
    }

    #[tokio::test]
    async fn test_small_delete_is_one_transaction() {
        let backend = MemoryBackend::new();
        let storage = shared_storage(backend.clone(), 10);
        let role_id = role_with_members(&storage, 3).await;

        let outcome =
            Cascade::default().delete(&storage, EntityKind::Role, &role_id, None).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Completed { edges_removed: 4 });
        assert!(backend.is_empty().await);
        assert_eq!(backend.metrics().unwrap().transactions.count, 1);
    }

    #[tokio::test]
    async fn test_large_delete_sweeps_inline_without_worker() {
        let backend = MemoryBackend::new();
        let storage = shared_storage(backend.clone(), 10);
        let role_id = role_with_members(&storage, 12).await;

        let cascade = Cascade::new(5, 4);
        let outcome = cascade.delete(&storage, EntityKind::Role, &role_id, None).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Completed { edges_removed: 13 });
        assert!(backend.is_empty().await);
        // 13 edges in batches of 4
        assert_eq!(backend.metrics().unwrap().transactions.count, 4);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let storage = shared_storage(MemoryBackend::new(), 10);
        let role_id = role_with_members(&storage, 2).await;

        let cascade = Cascade::default();
        assert_eq!(cascade.sweep(&storage, EntityKind::Role, &role_id).await.unwrap(), 3);
        assert_eq!(cascade.sweep(&storage, EntityKind::Role, &role_id).await.unwrap(), 0);
        // metadata is not the sweep's concern
        assert!(storage.entities().exists(EntityKind::Role, &role_id).await.unwrap());
    }

    #[test]
    fn test_limits_are_clamped() {
        let cascade = Cascade::new(0, 10_000);
        assert_eq!(cascade.max_transaction_items(), 1);
        assert_eq!(cascade.sweep_batch_size(), MAX_TRANSACTION_ITEMS);
    }
}
