//! Storage backend metrics
//!
//! Plain atomic counters kept by the backend itself. The `metrics` facade
//! counters in `rolegate-observe` are process-wide; these are per backend
//! instance and readable through [`StorageBackend::metrics`](crate::StorageBackend::metrics).

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Count, cumulative latency and failures for one class of operation.
#[derive(Debug, Default)]
struct OpCounter {
    count: AtomicU64,
    latency_us: AtomicU64,
    errors: AtomicU64,
}

impl OpCounter {
    fn record(&self, duration: Duration, error: bool) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.latency_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn stats(&self) -> OpStats {
        let count = self.count.load(Ordering::Relaxed);
        let latency = self.latency_us.load(Ordering::Relaxed);
        OpStats {
            count,
            avg_latency_us: if count > 0 { latency / count } else { 0 },
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.latency_us.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

/// Storage operation metrics
#[derive(Debug, Default)]
pub struct StoreMetrics {
    reads: OpCounter,
    writes: OpCounter,
    deletes: OpCounter,
    queries: OpCounter,
    transactions: OpCounter,
    condition_failures: AtomicU64,
    total_items: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self, duration: Duration, error: bool) {
        self.reads.record(duration, error);
    }

    pub fn record_write(&self, duration: Duration, error: bool) {
        self.writes.record(duration, error);
    }

    pub fn record_delete(&self, duration: Duration, error: bool) {
        self.deletes.record(duration, error);
    }

    /// Record one page of a primary or index query
    pub fn record_query(&self, duration: Duration, error: bool) {
        self.queries.record(duration, error);
    }

    pub fn record_transaction(&self, duration: Duration, error: bool) {
        self.transactions.record(duration, error);
    }

    /// A conditional write lost to an existing key
    pub fn record_condition_failure(&self) {
        self.condition_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_total_items(&self, items: u64) {
        self.total_items.store(items, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reads: self.reads.stats(),
            writes: self.writes.stats(),
            deletes: self.deletes.stats(),
            queries: self.queries.stats(),
            transactions: self.transactions.stats(),
            condition_failures: self.condition_failures.load(Ordering::Relaxed),
            total_items: self.total_items.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters except the item gauge
    pub fn reset(&self) {
        self.reads.reset();
        self.writes.reset();
        self.deletes.reset();
        self.queries.reset();
        self.transactions.reset();
        self.condition_failures.store(0, Ordering::Relaxed);
    }
}

/// Per-operation figures inside a [`MetricsSnapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpStats {
    pub count: u64,
    pub avg_latency_us: u64,
    pub errors: u64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub reads: OpStats,
    pub writes: OpStats,
    pub deletes: OpStats,
    pub queries: OpStats,
    pub transactions: OpStats,
    pub condition_failures: u64,
    pub total_items: u64,
}

impl MetricsSnapshot {
    pub fn total_operations(&self) -> u64 {
        self.reads.count
            + self.writes.count
            + self.deletes.count
            + self.queries.count
            + self.transactions.count
    }

    pub fn total_errors(&self) -> u64 {
        self.reads.errors
            + self.writes.errors
            + self.deletes.errors
            + self.queries.errors
            + self.transactions.errors
    }

    pub fn error_rate(&self) -> f64 {
        let total = self.total_operations();
        if total == 0 { 0.0 } else { self.total_errors() as f64 / total as f64 }
    }
}

/// Timer that measures one storage operation.
pub struct OpTimer {
    start: Instant,
}

impl OpTimer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for OpTimer {
    fn default() -> Self {
        Self::new()
    }
}
