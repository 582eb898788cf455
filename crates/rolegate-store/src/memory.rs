//! In-memory storage backend for testing and development
//!
//! Both secondary indexes are updated under the same write lock as the
//! primary table, so reads through an index are strongly consistent here.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    ops::Bound,
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    MAX_TRANSACTION_ITEMS, StorageBackend,
    error::{StorageError, StorageResult},
    metrics::{MetricsSnapshot, OpTimer, StoreMetrics},
    types::{ContinuationToken, IndexName, Item, ItemKey, Page, QueryRequest, WriteOp},
};

/// In-memory single-table store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<Tables>>,
    metrics: Arc<StoreMetrics>,
}

#[derive(Default)]
struct Tables {
    /// Primary storage
    items: BTreeMap<ItemKey, Item>,

    /// `(sort, partition)` for reverse lookups
    inverted: BTreeSet<(String, String)>,

    /// `(entity_type, partition, sort)` for listings
    by_type: BTreeSet<(String, String, String)>,
}

impl Tables {
    fn insert(&mut self, item: Item) {
        self.remove(&item.key);
        self.inverted.insert((item.key.sort.clone(), item.key.partition.clone()));
        if let Some(entity_type) = &item.entity_type {
            self.by_type.insert((
                entity_type.clone(),
                item.key.partition.clone(),
                item.key.sort.clone(),
            ));
        }
        self.items.insert(item.key.clone(), item);
    }

    fn remove(&mut self, key: &ItemKey) -> bool {
        let Some(old) = self.items.remove(key) else {
            return false;
        };
        self.inverted.remove(&(key.sort.clone(), key.partition.clone()));
        if let Some(entity_type) = old.entity_type {
            self.by_type.remove(&(entity_type, key.partition.clone(), key.sort.clone()));
        }
        true
    }

    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::Put(item) | WriteOp::PutIfAbsent(item) => self.insert(item),
            WriteOp::Delete(key) => {
                self.remove(&key);
            },
        }
    }

    fn query_primary(&self, request: &QueryRequest) -> StorageResult<Page<Item>> {
        let lower = match resume_position(request.start.as_ref(), 1)? {
            Some(mut parts) => {
                Bound::Excluded(ItemKey::new(&request.partition, parts.remove(0)))
            },
            None => Bound::Included(ItemKey::new(
                &request.partition,
                request.condition.lower_bound(),
            )),
        };

        let matches = self
            .items
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| {
                key.partition == request.partition && !request.condition.is_past(&key.sort)
            })
            .filter(|(key, _)| request.condition.matches(&key.sort))
            .map(|(key, item)| (vec![key.sort.clone()], item.clone()));

        collect_page(matches, request.limit)
    }

    fn query_inverted(&self, request: &QueryRequest) -> StorageResult<Page<Item>> {
        let lower = match resume_position(request.start.as_ref(), 1)? {
            Some(mut parts) => Bound::Excluded((request.partition.clone(), parts.remove(0))),
            None => Bound::Included((
                request.partition.clone(),
                request.condition.lower_bound().to_string(),
            )),
        };

        let matches = self
            .inverted
            .range((lower, Bound::Unbounded))
            .take_while(|(sort, partition)| {
                *sort == request.partition && !request.condition.is_past(partition)
            })
            .filter(|(_, partition)| request.condition.matches(partition))
            .filter_map(|(sort, partition)| {
                let key = ItemKey::new(partition, sort);
                self.items.get(&key).map(|item| (vec![partition.clone()], item.clone()))
            });

        collect_page(matches, request.limit)
    }

    fn query_by_type(&self, request: &QueryRequest) -> StorageResult<Page<Item>> {
        let lower = match resume_position(request.start.as_ref(), 2)? {
            Some(mut parts) => {
                let sort = parts.remove(1);
                let partition = parts.remove(0);
                Bound::Excluded((request.partition.clone(), partition, sort))
            },
            None => Bound::Included((
                request.partition.clone(),
                request.condition.lower_bound().to_string(),
                String::new(),
            )),
        };

        let matches = self
            .by_type
            .range((lower, Bound::Unbounded))
            .take_while(|(entity_type, partition, _)| {
                *entity_type == request.partition && !request.condition.is_past(partition)
            })
            .filter(|(_, partition, _)| request.condition.matches(partition))
            .filter_map(|(_, partition, sort)| {
                let key = ItemKey::new(partition, sort);
                self.items
                    .get(&key)
                    .map(|item| (vec![partition.clone(), sort.clone()], item.clone()))
            });

        collect_page(matches, request.limit)
    }
}

/// Decode a continuation token into exactly `arity` position parts.
fn resume_position(
    token: Option<&ContinuationToken>,
    arity: usize,
) -> StorageResult<Option<Vec<String>>> {
    let Some(token) = token else {
        return Ok(None);
    };
    let parts = token.to_parts()?;
    if parts.len() != arity {
        return Err(StorageError::InvalidToken {
            message: format!("expected {} position parts, got {}", arity, parts.len()),
        });
    }
    Ok(Some(parts))
}

/// Take one page from an ordered stream of `(position, item)` matches.
///
/// A token is issued only when another match exists past the page.
fn collect_page(
    mut matches: impl Iterator<Item = (Vec<String>, Item)>,
    limit: Option<usize>,
) -> StorageResult<Page<Item>> {
    let limit = limit.filter(|l| *l > 0);
    let mut items = Vec::new();
    let mut last = None;

    while limit.is_none_or(|l| items.len() < l) {
        match matches.next() {
            Some((position, item)) => {
                last = Some(position);
                items.push(item);
            },
            None => return Ok(Page::new(items, None)),
        }
    }

    let next = match (matches.next(), last) {
        (Some(_), Some(position)) => Some(ContinuationToken::from_parts(&position)?),
        _ => None,
    };
    Ok(Page::new(items, next))
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items in the primary table
    pub async fn len(&self) -> usize {
        self.data.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.items.is_empty()
    }

    /// Every key currently stored, in primary order
    pub async fn keys(&self) -> Vec<ItemKey> {
        self.data.read().await.items.keys().cloned().collect()
    }

    pub async fn clear(&self) {
        let mut data = self.data.write().await;
        *data = Tables::default();
        self.metrics.set_total_items(0);
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &ItemKey) -> StorageResult<Option<Item>> {
        let timer = OpTimer::new();
        let item = self.data.read().await.items.get(key).cloned();
        self.metrics.record_read(timer.elapsed(), false);
        Ok(item)
    }

    async fn put(&self, item: Item) -> StorageResult<()> {
        let timer = OpTimer::new();
        let mut data = self.data.write().await;
        data.insert(item);
        self.metrics.set_total_items(data.items.len() as u64);
        self.metrics.record_write(timer.elapsed(), false);
        Ok(())
    }

    async fn put_if_absent(&self, item: Item) -> StorageResult<()> {
        let timer = OpTimer::new();
        let mut data = self.data.write().await;
        if data.items.contains_key(&item.key) {
            self.metrics.record_condition_failure();
            self.metrics.record_write(timer.elapsed(), true);
            return Err(StorageError::condition_failed(item.key.to_string()));
        }
        data.insert(item);
        self.metrics.set_total_items(data.items.len() as u64);
        self.metrics.record_write(timer.elapsed(), false);
        Ok(())
    }

    async fn delete(&self, key: &ItemKey) -> StorageResult<()> {
        let timer = OpTimer::new();
        let mut data = self.data.write().await;
        if !data.remove(key) {
            debug!(key = %key, "Delete of missing key");
        }
        self.metrics.set_total_items(data.items.len() as u64);
        self.metrics.record_delete(timer.elapsed(), false);
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> StorageResult<Page<Item>> {
        let timer = OpTimer::new();
        let result = self.data.read().await.query_primary(&request);
        self.metrics.record_query(timer.elapsed(), result.is_err());
        result
    }

    async fn query_index(
        &self,
        index: IndexName,
        request: QueryRequest,
    ) -> StorageResult<Page<Item>> {
        let timer = OpTimer::new();
        let data = self.data.read().await;
        let result = match index {
            IndexName::Inverted => data.query_inverted(&request),
            IndexName::EntityType => data.query_by_type(&request),
        };
        self.metrics.record_query(timer.elapsed(), result.is_err());
        result
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> StorageResult<()> {
        let timer = OpTimer::new();
        if ops.len() > MAX_TRANSACTION_ITEMS {
            self.metrics.record_transaction(timer.elapsed(), true);
            return Err(StorageError::TransactionTooLarge {
                size: ops.len(),
                max: MAX_TRANSACTION_ITEMS,
            });
        }

        let mut seen = HashSet::with_capacity(ops.len());
        if let Some(dup) = ops.iter().map(WriteOp::key).find(|key| !seen.insert(*key)) {
            self.metrics.record_transaction(timer.elapsed(), true);
            return Err(StorageError::internal(format!(
                "transaction touches key {} more than once",
                dup
            )));
        }

        let mut data = self.data.write().await;
        for op in &ops {
            if let WriteOp::PutIfAbsent(item) = op
                && data.items.contains_key(&item.key)
            {
                self.metrics.record_condition_failure();
                self.metrics.record_transaction(timer.elapsed(), true);
                return Err(StorageError::condition_failed(item.key.to_string()));
            }
        }

        let count = ops.len();
        for op in ops {
            data.apply(op);
        }
        self.metrics.set_total_items(data.items.len() as u64);
        self.metrics.record_transaction(timer.elapsed(), false);
        debug!(ops = count, "Committed transaction");
        Ok(())
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::SortCondition;

    fn item(partition: &str, sort: &str) -> Item {
        Item::new(ItemKey::new(partition, sort), b"{}".to_vec())
    }

    async fn drain(
        backend: &MemoryBackend,
        index: Option<IndexName>,
        request: QueryRequest,
    ) -> Vec<Item> {
        let mut out = Vec::new();
        let mut start = None;
        loop {
            let req = request.clone().with_start(start);
            let page = match index {
                Some(index) => backend.query_index(index, req).await.unwrap(),
                None => backend.query(req).await.unwrap(),
            };
            out.extend(page.items);
            match page.next {
                Some(token) => start = Some(token),
                None => return out,
            }
        }
    }

    // ===== POINT OPERATIONS =====

    #[tokio::test]
    async fn test_put_get_delete() {
        let backend = MemoryBackend::new();
        let key = ItemKey::new("USER#u1", "METADATA#u1");

        backend.put(item("USER#u1", "METADATA#u1")).await.unwrap();
        assert!(backend.get(&key).await.unwrap().is_some());

        backend.delete(&key).await.unwrap();
        assert!(backend.get(&key).await.unwrap().is_none());

        // idempotent
        backend.delete(&key).await.unwrap();
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_if_absent_rejects_existing() {
        let backend = MemoryBackend::new();
        backend.put_if_absent(item("ROLE#r1", "METADATA#r1")).await.unwrap();

        let mut replacement = item("ROLE#r1", "METADATA#r1");
        replacement.body = b"{\"changed\":true}".to_vec();
        let err = backend.put_if_absent(replacement).await.unwrap_err();
        assert!(matches!(err, StorageError::ConditionFailed { .. }));

        let stored = backend.get(&ItemKey::new("ROLE#r1", "METADATA#r1")).await.unwrap().unwrap();
        assert_eq!(stored.body, b"{}".to_vec());
        assert_eq!(backend.metrics().unwrap().condition_failures, 1);
    }

    // ===== QUERY TESTS =====

    #[tokio::test]
    async fn test_query_begins_with_stays_in_partition() {
        let backend = MemoryBackend::new();
        backend.put(item("USER#u1", "METADATA#u1")).await.unwrap();
        backend.put(item("USER#u1", "ROLE#a")).await.unwrap();
        backend.put(item("USER#u1", "ROLE#b")).await.unwrap();
        backend.put(item("USER#u2", "ROLE#c")).await.unwrap();

        let page = backend
            .query(
                QueryRequest::new("USER#u1").with_condition(SortCondition::begins_with("ROLE#")),
            )
            .await
            .unwrap();

        let sorts: Vec<_> = page.items.iter().map(|i| i.key.sort.as_str()).collect();
        assert_eq!(sorts, vec!["ROLE#a", "ROLE#b"]);
        assert!(page.is_last());
    }

    #[tokio::test]
    async fn test_query_pages_without_gaps_or_duplicates() {
        let backend = MemoryBackend::new();
        for i in 0..25 {
            backend.put(item("ROLE#r1", &format!("PERMISSION#p{:02}", i))).await.unwrap();
        }

        let request = QueryRequest::new("ROLE#r1")
            .with_condition(SortCondition::begins_with("PERMISSION#"))
            .with_limit(10);
        let first = backend.query(request.clone()).await.unwrap();
        assert_eq!(first.items.len(), 10);
        assert!(first.next.is_some());

        let all = drain(&backend, None, request).await;
        assert_eq!(all.len(), 25);
        let unique: BTreeSet<_> = all.iter().map(|i| i.key.sort.clone()).collect();
        assert_eq!(unique.len(), 25);
    }

    #[tokio::test]
    async fn test_exact_page_boundary_has_no_token() {
        let backend = MemoryBackend::new();
        for i in 0..4 {
            backend.put(item("ROLE#r1", &format!("PERMISSION#p{}", i))).await.unwrap();
        }
        let page = backend.query(QueryRequest::new("ROLE#r1").with_limit(4)).await.unwrap();
        assert_eq!(page.items.len(), 4);
        assert!(page.is_last());
    }

    #[tokio::test]
    async fn test_invalid_token_rejected() {
        let backend = MemoryBackend::new();
        let request = QueryRequest::new("ROLE#r1")
            .with_start(Some(ContinuationToken::from("%%%".to_string())));
        let err = backend.query(request).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidToken { .. }));
    }

    // ===== INDEX TESTS =====

    #[tokio::test]
    async fn test_inverted_index_follows_writes() {
        let backend = MemoryBackend::new();
        backend.put(item("USER#u1", "ROLE#admin")).await.unwrap();
        backend.put(item("USER#u2", "ROLE#admin")).await.unwrap();
        backend.put(item("USER#u3", "ROLE#viewer")).await.unwrap();

        let request =
            QueryRequest::new("ROLE#admin").with_condition(SortCondition::begins_with("USER#"));
        let holders = drain(&backend, Some(IndexName::Inverted), request.clone().with_limit(1))
            .await;
        let partitions: Vec<_> = holders.iter().map(|i| i.key.partition.as_str()).collect();
        assert_eq!(partitions, vec!["USER#u1", "USER#u2"]);

        backend.delete(&ItemKey::new("USER#u1", "ROLE#admin")).await.unwrap();
        let holders = drain(&backend, Some(IndexName::Inverted), request).await;
        assert_eq!(holders.len(), 1);
    }

    #[tokio::test]
    async fn test_entity_type_index_lists_only_tagged_items() {
        let backend = MemoryBackend::new();
        for id in ["a", "b", "c"] {
            backend
                .put(
                    item(&format!("ROLE#{}", id), &format!("METADATA#{}", id))
                        .with_entity_type("ROLE"),
                )
                .await
                .unwrap();
        }
        backend.put(item("ROLE#a", "PERMISSION#p1")).await.unwrap();
        backend
            .put(item("USER#u1", "METADATA#u1").with_entity_type("USER"))
            .await
            .unwrap();

        let roles =
            drain(&backend, Some(IndexName::EntityType), QueryRequest::new("ROLE").with_limit(2))
                .await;
        let partitions: Vec<_> = roles.iter().map(|i| i.key.partition.as_str()).collect();
        assert_eq!(partitions, vec!["ROLE#a", "ROLE#b", "ROLE#c"]);
    }

    // ===== TRANSACTION TESTS =====

    #[tokio::test]
    async fn test_transaction_is_all_or_nothing() {
        let backend = MemoryBackend::new();
        backend.put(item("USER#u1", "METADATA#u1")).await.unwrap();

        let ops = vec![
            WriteOp::Put(item("USER#u2", "METADATA#u2")),
            WriteOp::PutIfAbsent(item("USER#u1", "METADATA#u1")),
        ];
        let err = backend.transact_write(ops).await.unwrap_err();
        assert!(matches!(err, StorageError::ConditionFailed { .. }));
        assert!(backend.get(&ItemKey::new("USER#u2", "METADATA#u2")).await.unwrap().is_none());

        let ops = vec![
            WriteOp::Put(item("USER#u2", "METADATA#u2")),
            WriteOp::Delete(ItemKey::new("USER#u1", "METADATA#u1")),
        ];
        backend.transact_write(ops).await.unwrap();
        assert_eq!(backend.keys().await, vec![ItemKey::new("USER#u2", "METADATA#u2")]);
    }

    #[tokio::test]
    async fn test_transaction_size_limit() {
        let backend = MemoryBackend::new();
        let ops: Vec<_> = (0..=MAX_TRANSACTION_ITEMS)
            .map(|i| WriteOp::Put(item("ROLE#r1", &format!("PERMISSION#{}", i))))
            .collect();
        let err = backend.transact_write(ops).await.unwrap_err();
        assert_eq!(
            err,
            StorageError::TransactionTooLarge {
                size: MAX_TRANSACTION_ITEMS + 1,
                max: MAX_TRANSACTION_ITEMS
            }
        );
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_transaction_rejects_duplicate_keys() {
        let backend = MemoryBackend::new();
        let ops = vec![
            WriteOp::Put(item("ROLE#r1", "METADATA#r1")),
            WriteOp::Delete(ItemKey::new("ROLE#r1", "METADATA#r1")),
        ];
        assert!(backend.transact_write(ops).await.is_err());
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let backend = MemoryBackend::new();
        let other = backend.clone();
        backend.put(item("USER#u1", "METADATA#u1")).await.unwrap();
        assert_eq!(other.len().await, 1);
        other.clear().await;
        assert!(backend.is_empty().await);
    }
}
