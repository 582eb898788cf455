//! # Rolegate Store - Storage Abstraction Layer
//!
//! Provides the key-value interface the RBAC core is written against, plus an
//! in-memory implementation for tests and development.
//!
//! ## Model
//!
//! One physical table of [`Item`]s, each addressed by a two-part
//! [`ItemKey`] (partition + sort). Range queries fix a partition and filter
//! the sort key. Two secondary indexes re-key the same items:
//!
//! - [`IndexName::Inverted`]: partition and sort swapped, so "everything that
//!   points at X" is a single range query.
//! - [`IndexName::EntityType`]: keyed by the optional `entity_type`
//!   attribute, so "list every X" never scans the table.
//!
//! Backends are injected explicitly; nothing in this crate is global.

#![deny(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;

pub mod error;
pub mod memory;
pub mod metrics;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use metrics::{MetricsSnapshot, OpTimer, StoreMetrics};
pub use types::{
    ContinuationToken, IndexName, Item, ItemKey, Page, QueryRequest, SortCondition, WriteOp,
};

/// Largest number of operations a single [`StorageBackend::transact_write`]
/// call may carry.
pub const MAX_TRANSACTION_ITEMS: usize = 100;

/// The abstract key-value store interface.
///
/// Backends must provide per-key atomic writes and a conditional
/// create-if-absent write; nothing else is assumed about isolation between
/// keys except inside [`transact_write`](StorageBackend::transact_write).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Point read.
    async fn get(&self, key: &ItemKey) -> StorageResult<Option<Item>>;

    /// Unconditional upsert.
    async fn put(&self, item: Item) -> StorageResult<()>;

    /// Write only if no item exists at the key.
    ///
    /// Returns [`StorageError::ConditionFailed`] when the key is taken.
    async fn put_if_absent(&self, item: Item) -> StorageResult<()>;

    /// Point delete. Deleting a missing key is not an error.
    async fn delete(&self, key: &ItemKey) -> StorageResult<()>;

    /// Range query over one partition of the primary key.
    async fn query(&self, request: QueryRequest) -> StorageResult<Page<Item>>;

    /// Range query over one partition of a secondary index.
    ///
    /// Indexes may lag the primary table on eventually-consistent backends.
    async fn query_index(
        &self,
        index: IndexName,
        request: QueryRequest,
    ) -> StorageResult<Page<Item>>;

    /// Apply every operation or none of them.
    ///
    /// At most [`MAX_TRANSACTION_ITEMS`] operations are accepted.
    async fn transact_write(&self, ops: Vec<WriteOp>) -> StorageResult<()>;

    /// Get metrics snapshot (optional, returns None if not supported)
    fn metrics(&self) -> Option<MetricsSnapshot> {
        None
    }
}

#[async_trait]
impl<T: StorageBackend + ?Sized> StorageBackend for Arc<T> {
    async fn get(&self, key: &ItemKey) -> StorageResult<Option<Item>> {
        (**self).get(key).await
    }

    async fn put(&self, item: Item) -> StorageResult<()> {
        (**self).put(item).await
    }

    async fn put_if_absent(&self, item: Item) -> StorageResult<()> {
        (**self).put_if_absent(item).await
    }

    async fn delete(&self, key: &ItemKey) -> StorageResult<()> {
        (**self).delete(key).await
    }

    async fn query(&self, request: QueryRequest) -> StorageResult<Page<Item>> {
        (**self).query(request).await
    }

    async fn query_index(
        &self,
        index: IndexName,
        request: QueryRequest,
    ) -> StorageResult<Page<Item>> {
        (**self).query_index(index, request).await
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> StorageResult<()> {
        (**self).transact_write(ops).await
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        (**self).metrics()
    }
}
