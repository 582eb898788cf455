//! Entity store: metadata records for users, roles and permissions.
//!
//! Generic over [`Entity`], so create/get/update are written once and
//! parameterized by the record's [`EntityKind`].
//!
//! # Key Schema
//!
//! - `{KIND}#{id}` / `METADATA#{id}` → JSON-serialized entity, tagged with
//!   `entity_type = {KIND}` for the listing index

use chrono::Utc;
use rolegate_store::{StorageBackend, StorageError};
use rolegate_types::{Entity, EntityKind};
use tracing::debug;

use crate::{
    decode_item, encode_item,
    error::{RepositoryError, RepositoryResult},
    keys,
    listing::ListingIndex,
};

/// Repository for entity metadata records.
#[derive(Clone)]
pub struct EntityStore<S: StorageBackend> {
    storage: S,
    listing: ListingIndex<S>,
}

impl<S: StorageBackend + Clone> EntityStore<S> {
    pub fn new(storage: S) -> Self {
        let listing = ListingIndex::new(storage.clone());
        Self { storage, listing }
    }

    pub fn with_listing(storage: S, listing: ListingIndex<S>) -> Self {
        Self { storage, listing }
    }
}

impl<S: StorageBackend> EntityStore<S> {
    /// Create a new entity.
    ///
    /// Timestamps are stamped here and override whatever the caller set.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if a record with the same identity exists; the
    /// existing record is left untouched.
    pub async fn create<E: Entity>(&self, mut entity: E) -> RepositoryResult<E> {
        let key = keys::metadata::encode(E::KIND, entity.id())?;
        let now = Utc::now();
        entity.stamp(now, now);

        let item = encode_item(key, &entity)?.with_entity_type(E::KIND.as_str());
        match self.storage.put_if_absent(item).await {
            Ok(()) => {
                debug!(kind = %E::KIND, id = entity.id(), "Created entity");
                Ok(entity)
            },
            Err(StorageError::ConditionFailed { .. }) => Err(RepositoryError::AlreadyExists(
                format!("{} {} already exists", E::KIND, entity.id()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Get an entity by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record exists.
    pub async fn get<E: Entity>(&self, id: &str) -> RepositoryResult<E> {
        self.find::<E>(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("{} {} not found", E::KIND, id)))
    }

    /// Get an entity by id, `None` when absent.
    pub async fn find<E: Entity>(&self, id: &str) -> RepositoryResult<Option<E>> {
        let key = keys::metadata::encode(E::KIND, id)?;
        match self.storage.get(&key).await? {
            Some(item) => Ok(Some(decode_item(&item)?)),
            None => Ok(None),
        }
    }

    /// Whether a metadata record exists for `(kind, id)`.
    pub async fn exists(&self, kind: EntityKind, id: &str) -> RepositoryResult<bool> {
        let key = keys::metadata::encode(kind, id)?;
        Ok(self.storage.get(&key).await?.is_some())
    }

    /// Replace the mutable fields of an existing entity.
    ///
    /// `created_at` is preserved from the stored record, `updated_at` is
    /// restamped.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the entity does not exist.
    pub async fn update<E: Entity>(&self, mut entity: E) -> RepositoryResult<E> {
        let existing = self.get::<E>(entity.id()).await?;
        entity.stamp(existing.created_at(), Utc::now());

        let key = keys::metadata::encode(E::KIND, entity.id())?;
        let item = encode_item(key, &entity)?.with_entity_type(E::KIND.as_str());
        self.storage.put(item).await?;
        debug!(kind = %E::KIND, id = entity.id(), "Updated entity");
        Ok(entity)
    }

    /// Delete a metadata record. Incident edges are not touched.
    pub async fn remove(&self, kind: EntityKind, id: &str) -> RepositoryResult<()> {
        let key = keys::metadata::encode(kind, id)?;
        self.storage.delete(&key).await?;
        Ok(())
    }

    /// Every entity of kind `E`, via the listing index.
    pub async fn list_all<E: Entity>(&self) -> RepositoryResult<Vec<E>> {
        self.listing.list_all::<E>().await
    }
}
