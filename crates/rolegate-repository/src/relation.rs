//! Relation store: the assignment edges of the RBAC graph.
//!
//! # Key Schema
//!
//! - `USER#{user}` / `ROLE#{role}` → JSON [`Edge`] (user holds role)
//! - `ROLE#{role}` / `PERMISSION#{perm}` → JSON [`Edge`] (role grants permission)
//!
//! Forward traversal queries the source partition with a `{TARGET}#` sort
//! prefix. Reverse traversal runs the same query against the inverted index,
//! where the target segment is the partition.
//!
//! Traversals that span several pages either return every neighbor or fail;
//! a page error never yields a silently truncated list.

use rolegate_store::{
    ContinuationToken, IndexName, ItemKey, Page, QueryRequest, SortCondition, StorageBackend,
};
use rolegate_types::{Edge, EdgeKind, EntityKind};
use tracing::debug;

use crate::{
    DEFAULT_PAGE_SIZE, decode_item, encode_item,
    error::RepositoryResult,
    keys,
};

#[derive(Clone)]
pub struct RelationStore<S: StorageBackend> {
    storage: S,
    page_size: usize,
}

impl<S: StorageBackend> RelationStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_page_size(storage, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(storage: S, page_size: usize) -> Self {
        Self { storage, page_size: page_size.max(1) }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Record an edge. Re-assigning an existing pair overwrites
    /// `assigned_at` and is otherwise a no-op.
    ///
    /// Endpoint existence is the caller's concern.
    pub async fn assign(
        &self,
        kind: EdgeKind,
        source_id: &str,
        target_id: &str,
    ) -> RepositoryResult<Edge> {
        let key = keys::edge::encode(kind.source(), source_id, kind.target(), target_id)?;
        let edge = Edge::new(kind, source_id, target_id);
        self.storage.put(encode_item(key, &edge)?).await?;
        debug!(?kind, source = source_id, target = target_id, "Assigned edge");
        Ok(edge)
    }

    /// Delete an edge. Removing an absent edge succeeds.
    pub async fn remove(
        &self,
        kind: EdgeKind,
        source_id: &str,
        target_id: &str,
    ) -> RepositoryResult<()> {
        let key = keys::edge::encode(kind.source(), source_id, kind.target(), target_id)?;
        self.storage.delete(&key).await?;
        debug!(?kind, source = source_id, target = target_id, "Removed edge");
        Ok(())
    }

    /// Read a single edge record.
    pub async fn get(
        &self,
        kind: EdgeKind,
        source_id: &str,
        target_id: &str,
    ) -> RepositoryResult<Option<Edge>> {
        let key = keys::edge::encode(kind.source(), source_id, kind.target(), target_id)?;
        match self.storage.get(&key).await? {
            Some(item) => Ok(Some(decode_item(&item)?)),
            None => Ok(None),
        }
    }

    /// One page of target ids reachable from `(source_kind, source_id)`.
    pub async fn forward_page(
        &self,
        source_kind: EntityKind,
        source_id: &str,
        target_kind: EntityKind,
        limit: usize,
        start: Option<ContinuationToken>,
    ) -> RepositoryResult<Page<String>> {
        keys::validate_id(source_id)?;
        let request = QueryRequest::new(keys::segment(source_kind, source_id))
            .with_condition(SortCondition::BeginsWith(keys::kind_prefix(target_kind)))
            .with_limit(limit.max(1))
            .with_start(start);
        let page = self.storage.query(request).await?;
        page.try_map(|item| keys::edge::decode(&item.key).map(|edge| edge.target_id))
    }

    /// Every target id reachable from `(source_kind, source_id)`.
    pub async fn forward_neighbors(
        &self,
        source_kind: EntityKind,
        source_id: &str,
        target_kind: EntityKind,
    ) -> RepositoryResult<Vec<String>> {
        let mut out = Vec::new();
        let mut start = None;
        loop {
            let page = self
                .forward_page(source_kind, source_id, target_kind, self.page_size, start)
                .await?;
            out.extend(page.items);
            match page.next {
                Some(token) => start = Some(token),
                None => return Ok(out),
            }
        }
    }

    /// One page of source ids pointing at `(target_kind, target_id)`.
    pub async fn reverse_page(
        &self,
        target_kind: EntityKind,
        target_id: &str,
        source_kind: EntityKind,
        limit: usize,
        start: Option<ContinuationToken>,
    ) -> RepositoryResult<Page<String>> {
        keys::validate_id(target_id)?;
        let request = QueryRequest::new(keys::segment(target_kind, target_id))
            .with_condition(SortCondition::BeginsWith(keys::kind_prefix(source_kind)))
            .with_limit(limit.max(1))
            .with_start(start);
        let page = self.storage.query_index(IndexName::Inverted, request).await?;
        page.try_map(|item| keys::edge::decode(&item.key).map(|edge| edge.source_id))
    }

    /// Every source id pointing at `(target_kind, target_id)`.
    pub async fn reverse_neighbors(
        &self,
        target_kind: EntityKind,
        target_id: &str,
        source_kind: EntityKind,
    ) -> RepositoryResult<Vec<String>> {
        let mut out = Vec::new();
        let mut start = None;
        loop {
            let page = self
                .reverse_page(target_kind, target_id, source_kind, self.page_size, start)
                .await?;
            out.extend(page.items);
            match page.next {
                Some(token) => start = Some(token),
                None => return Ok(out),
            }
        }
    }

    /// Full edge records from a source, including `assigned_at`.
    pub async fn edges_of(
        &self,
        source_kind: EntityKind,
        source_id: &str,
        target_kind: EntityKind,
    ) -> RepositoryResult<Vec<Edge>> {
        keys::validate_id(source_id)?;
        let base = QueryRequest::new(keys::segment(source_kind, source_id))
            .with_condition(SortCondition::BeginsWith(keys::kind_prefix(target_kind)))
            .with_limit(self.page_size);

        let mut out = Vec::new();
        let mut start = None;
        loop {
            let page = self.storage.query(base.clone().with_start(start)).await?;
            for item in &page.items {
                out.push(decode_item::<Edge>(item)?);
            }
            match page.next {
                Some(token) => start = Some(token),
                None => return Ok(out),
            }
        }
    }

    /// Keys of every edge touching `(kind, id)` in either direction.
    ///
    /// Metadata and effective-permission records in the same partition are
    /// not edges and are excluded.
    pub async fn incident_keys(&self, kind: EntityKind, id: &str) -> RepositoryResult<Vec<ItemKey>> {
        keys::validate_id(id)?;
        let segment = keys::segment(kind, id);
        let mut out = Vec::new();

        let forward = QueryRequest::new(segment.clone()).with_limit(self.page_size);
        self.drain_keys(None, forward, &mut out).await?;

        let reverse = QueryRequest::new(segment).with_limit(self.page_size);
        self.drain_keys(Some(IndexName::Inverted), reverse, &mut out).await?;

        debug!(%kind, id, edges = out.len(), "Collected incident edges");
        Ok(out)
    }

    async fn drain_keys(
        &self,
        index: Option<IndexName>,
        base: QueryRequest,
        out: &mut Vec<ItemKey>,
    ) -> RepositoryResult<()> {
        let mut start = None;
        loop {
            let request = base.clone().with_start(start);
            let page = match index {
                Some(index) => self.storage.query_index(index, request).await?,
                None => self.storage.query(request).await?,
            };
            out.extend(
                page.items.into_iter().map(|item| item.key).filter(keys::edge::is_edge),
            );
            match page.next {
                Some(token) => start = Some(token),
                None => return Ok(()),
            }
        }
    }
}
