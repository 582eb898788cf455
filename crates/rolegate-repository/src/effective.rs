//! Effective-permission records.
//!
//! One record per user at `USER#{id}` / `EFFECTIVE#{id}`, holding the
//! precomputed union of the user's permissions. The record lives in the
//! user's partition so a user's cascade sweeps it with the rest.

use rolegate_store::{StorageBackend, WriteOp};
use rolegate_types::EffectivePermissions;
use tracing::debug;

use crate::{decode_item, encode_item, error::RepositoryResult, keys};

#[derive(Clone)]
pub struct EffectiveStore<S: StorageBackend> {
    storage: S,
}

impl<S: StorageBackend> EffectiveStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub async fn get(&self, user_id: &str) -> RepositoryResult<Option<EffectivePermissions>> {
        let key = keys::effective::encode(user_id)?;
        match self.storage.get(&key).await? {
            Some(item) => Ok(Some(decode_item(&item)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the user's record. Last write wins.
    pub async fn put(&self, record: &EffectivePermissions) -> RepositoryResult<()> {
        let key = keys::effective::encode(record.user_id.as_str())?;
        self.storage.put(encode_item(key, record)?).await?;
        debug!(
            user = record.user_id.as_str(),
            permissions = record.permissions.len(),
            "Stored effective permissions"
        );
        Ok(())
    }

    pub async fn delete(&self, user_id: &str) -> RepositoryResult<()> {
        let key = keys::effective::encode(user_id)?;
        self.storage.delete(&key).await?;
        Ok(())
    }

    /// The delete operation for use inside a transaction.
    pub fn delete_op(&self, user_id: &str) -> RepositoryResult<WriteOp> {
        Ok(WriteOp::Delete(keys::effective::encode(user_id)?))
    }
}
