//! Fault-injecting storage backend.
//!
//! Wraps any [`StorageBackend`] and fails chosen calls on demand, so tests
//! can observe how the repositories and the resolver react to a store that
//! misbehaves halfway through a traversal.
//!
//! ```no_run
//! use rolegate_store::MemoryBackend;
//! use rolegate_test_fixtures::FlakyBackend;
//!
//! let flaky = FlakyBackend::new(MemoryBackend::new());
//! flaky.fail_partition("ROLE#rol_broken");
//! flaky.fail_queries_after(3);
//! ```
//!
//! [`FlakyBackend::hold_next_put`] parks a single write until the test
//! releases it, which lets a test interleave two calls deterministically.

use std::{
    collections::BTreeSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Notify;
use rolegate_store::{
    IndexName, Item, ItemKey, MetricsSnapshot, Page, QueryRequest, StorageBackend, StorageError,
    StorageResult, WriteOp,
};

#[derive(Default)]
struct Faults {
    partitions: BTreeSet<String>,
    queries_before_failure: Option<usize>,
    fail_writes: bool,
    query_delay: Option<Duration>,
    error: Option<StorageError>,
    held_put: Option<(String, Arc<PutGate>)>,
}

/// One parked put. See [`FlakyBackend::hold_next_put`].
#[derive(Default)]
pub struct PutGate {
    reached: Notify,
    released: Notify,
}

impl PutGate {
    /// Resolves once the held put has arrived at the backend.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let the held put through.
    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[derive(Clone)]
pub struct FlakyBackend<B> {
    inner: B,
    faults: Arc<Mutex<Faults>>,
    queries: Arc<AtomicUsize>,
}

impl<B: StorageBackend> FlakyBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner, faults: Arc::default(), queries: Arc::default() }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Fail every query (primary or index) on `partition`.
    pub fn fail_partition(&self, partition: impl Into<String>) {
        self.faults.lock().unwrap().partitions.insert(partition.into());
    }

    /// Let `n` more queries through, then fail every query after them.
    pub fn fail_queries_after(&self, n: usize) {
        let start = self.queries.load(Ordering::SeqCst);
        self.faults.lock().unwrap().queries_before_failure = Some(start + n);
    }

    /// Fail puts, deletes and transactions.
    pub fn fail_writes(&self, fail: bool) {
        self.faults.lock().unwrap().fail_writes = fail;
    }

    /// Sleep before answering each query.
    pub fn delay_queries(&self, delay: Duration) {
        self.faults.lock().unwrap().query_delay = Some(delay);
    }

    /// Error returned by injected failures. Defaults to a timeout.
    pub fn with_error(self, error: StorageError) -> Self {
        self.faults.lock().unwrap().error = Some(error);
        self
    }

    /// Park the next put whose sort key starts with `sort_prefix` until the
    /// returned gate is released. Later puts are not held.
    pub fn hold_next_put(&self, sort_prefix: impl Into<String>) -> Arc<PutGate> {
        let gate = Arc::new(PutGate::default());
        self.faults.lock().unwrap().held_put = Some((sort_prefix.into(), Arc::clone(&gate)));
        gate
    }

    /// Clear every injected fault.
    pub fn heal(&self) {
        *self.faults.lock().unwrap() = Faults::default();
    }

    /// Queries seen so far, failed ones included.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn injected(&self) -> StorageError {
        self.faults.lock().unwrap().error.clone().unwrap_or(StorageError::Timeout)
    }

    async fn before_query(&self, request: &QueryRequest) -> StorageResult<()> {
        let seen = self.queries.fetch_add(1, Ordering::SeqCst);
        let (delay, fail) = {
            let faults = self.faults.lock().unwrap();
            let fail = faults.partitions.contains(&request.partition)
                || faults.queries_before_failure.is_some_and(|limit| seen >= limit);
            (faults.query_delay, fail)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail { Err(self.injected()) } else { Ok(()) }
    }

    fn before_write(&self) -> StorageResult<()> {
        if self.faults.lock().unwrap().fail_writes { Err(self.injected()) } else { Ok(()) }
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for FlakyBackend<B> {
    async fn get(&self, key: &ItemKey) -> StorageResult<Option<Item>> {
        self.inner.get(key).await
    }

    async fn put(&self, item: Item) -> StorageResult<()> {
        self.before_write()?;
        let gate = {
            let mut faults = self.faults.lock().unwrap();
            let held = faults
                .held_put
                .as_ref()
                .is_some_and(|(prefix, _)| item.key.sort.starts_with(prefix.as_str()));
            if held { faults.held_put.take().map(|(_, gate)| gate) } else { None }
        };
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.released.notified().await;
        }
        self.inner.put(item).await
    }

    async fn put_if_absent(&self, item: Item) -> StorageResult<()> {
        self.before_write()?;
        self.inner.put_if_absent(item).await
    }

    async fn delete(&self, key: &ItemKey) -> StorageResult<()> {
        self.before_write()?;
        self.inner.delete(key).await
    }

    async fn query(&self, request: QueryRequest) -> StorageResult<Page<Item>> {
        self.before_query(&request).await?;
        self.inner.query(request).await
    }

    async fn query_index(
        &self,
        index: IndexName,
        request: QueryRequest,
    ) -> StorageResult<Page<Item>> {
        self.before_query(&request).await?;
        self.inner.query_index(index, request).await
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> StorageResult<()> {
        self.before_write()?;
        self.inner.transact_write(ops).await
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        self.inner.metrics()
    }
}
