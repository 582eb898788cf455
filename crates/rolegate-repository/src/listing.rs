//! Listing index: "all entities of kind X" without a table scan.
//!
//! Every metadata record carries its kind as the `entity_type` attribute,
//! which projects it into [`IndexName::EntityType`]. A listing is then a
//! single-partition query on that index.
//!
//! # Consistency
//!
//! The index is maintained by the backend. On a backend whose secondary
//! indexes are eventually consistent, an entity created a moment ago may be
//! missing from a listing even though [`EntityStore::get`] already finds it.
//! Callers needing read-your-writes must read by id.
//!
//! [`EntityStore::get`]: crate::EntityStore::get

use rolegate_store::{ContinuationToken, IndexName, Page, QueryRequest, StorageBackend};
use rolegate_types::Entity;
use tracing::debug;

use crate::{DEFAULT_PAGE_SIZE, decode_item, error::RepositoryResult};

#[derive(Clone)]
pub struct ListingIndex<S: StorageBackend> {
    storage: S,
    page_size: usize,
}

impl<S: StorageBackend> ListingIndex<S> {
    pub fn new(storage: S) -> Self {
        Self::with_page_size(storage, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(storage: S, page_size: usize) -> Self {
        Self { storage, page_size: page_size.max(1) }
    }

    /// One page of entities of kind `E`, ordered by partition key.
    pub async fn list_page<E: Entity>(
        &self,
        limit: usize,
        start: Option<ContinuationToken>,
    ) -> RepositoryResult<Page<E>> {
        let request =
            QueryRequest::new(E::KIND.as_str()).with_limit(limit.max(1)).with_start(start);
        let page = self.storage.query_index(IndexName::EntityType, request).await?;
        page.try_map(|item| decode_item::<E>(&item))
    }

    /// Every entity of kind `E`.
    ///
    /// Drains the index page by page; a failing page fails the whole call.
    pub async fn list_all<E: Entity>(&self) -> RepositoryResult<Vec<E>> {
        let mut out = Vec::new();
        let mut start = None;
        let mut pages = 0usize;
        loop {
            let page = self.list_page::<E>(self.page_size, start).await?;
            pages += 1;
            out.extend(page.items);
            match page.next {
                Some(token) => start = Some(token),
                None => break,
            }
        }
        debug!(kind = %E::KIND, count = out.len(), pages, "Listed entities");
        Ok(out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rolegate_store::MemoryBackend;
    use rolegate_types::{Permission, Role, User};

    use super::*;
    use crate::EntityStore;

    #[tokio::test]
    async fn test_list_all_spans_pages() {
        let backend = MemoryBackend::new();
        let entities = EntityStore::new(backend.clone());
        for i in 0..7 {
            entities.create(Role::new(format!("role-{}", i), "")).await.unwrap();
        }
        entities.create(User::new("Alice", "alice@example.com")).await.unwrap();

        let listing = ListingIndex::with_page_size(backend, 3);
        let roles = listing.list_all::<Role>().await.unwrap();
        assert_eq!(roles.len(), 7);

        let users = listing.list_all::<User>().await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(listing.list_all::<Permission>().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edges_are_not_listed() {
        let backend = MemoryBackend::new();
        let entities = EntityStore::new(backend.clone());
        entities.create(Permission::new("doc.read", "Read", "")).await.unwrap();
        crate::RelationStore::new(backend.clone())
            .assign(rolegate_types::EdgeKind::RolePermission, "r1", "doc.read")
            .await
            .unwrap();

        let listing = ListingIndex::new(backend);
        let page = listing.list_page::<Permission>(10, None).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.is_last());
    }
}
