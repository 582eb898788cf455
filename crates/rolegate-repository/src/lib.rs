//! Repository layer for the Rolegate RBAC graph.
//!
//! Domain repositories sitting on top of the generic [`StorageBackend`].
//! Each one owns a slice of the single-table keyspace and encapsulates the
//! key encoding and serialization for it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  rolegate-core                   │
//! │        (resolver, RBAC service, cascade)         │
//! ├──────────────────────────────────────────────────┤
//! │                Repository Layer                  │
//! │  EntityStore  │  RelationStore  │  ListingIndex  │
//! │  EffectiveStore                                  │
//! ├──────────────────────────────────────────────────┤
//! │                 rolegate-store                   │
//! │              StorageBackend trait                │
//! │ (get, put, put_if_absent, query, query_index, …) │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! The four stores share one keyspace but never a key: metadata, edges and
//! effective-permission records are told apart by their sort key (see
//! [`keys`]).

#![deny(unsafe_code)]

use rolegate_store::{Item, ItemKey};
use serde::{Serialize, de::DeserializeOwned};

pub mod effective;
pub mod entity;
pub mod error;
pub mod keys;
pub mod listing;
pub mod relation;
pub mod storage;

pub use effective::EffectiveStore;
pub use entity::EntityStore;
pub use error::{RepositoryError, RepositoryResult};
pub use listing::ListingIndex;
pub use relation::RelationStore;
pub use storage::RbacStorage;

/// Page size used when a caller drains a paginated query.
pub const DEFAULT_PAGE_SIZE: usize = 100;

pub(crate) fn encode_item<T: Serialize>(key: ItemKey, value: &T) -> RepositoryResult<Item> {
    Ok(Item::new(key, serde_json::to_vec(value)?))
}

pub(crate) fn decode_item<T: DeserializeOwned>(item: &Item) -> RepositoryResult<T> {
    serde_json::from_slice(&item.body).map_err(|e| {
        RepositoryError::Serialization(format!("record {}: {}", item.key, e))
    })
}

