//! Metrics for Rolegate operations
//!
//! Thin wrappers over the `metrics` facade so that metric names live in one
//! place. Without an installed recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Register descriptions for every metric below
pub fn init_metrics_descriptions() {
    // Authorization checks
    describe_counter!("rolegate_checks_total", "Total number of permission checks performed");
    describe_counter!("rolegate_checks_allowed_total", "Checks that resolved to allow");
    describe_counter!("rolegate_checks_denied_total", "Checks that resolved to deny");
    describe_histogram!(
        "rolegate_check_duration_seconds",
        "Duration of permission checks in seconds"
    );
    describe_counter!(
        "rolegate_roles_skipped_total",
        "Roles skipped during resolution because their permission lookup failed"
    );
    describe_counter!(
        "rolegate_effective_hits_total",
        "Cached checks answered from a stored effective-permission record"
    );
    describe_counter!(
        "rolegate_effective_misses_total",
        "Cached checks that fell back to live resolution"
    );

    // Cascading deletes
    describe_counter!("rolegate_cascade_deletes_total", "Entity deletions by kind and path");
    describe_counter!("rolegate_cascade_edges_removed_total", "Edges removed by cascading deletes");

    // Maintenance worker
    describe_counter!("rolegate_maintenance_tasks_total", "Maintenance tasks processed");
    describe_counter!(
        "rolegate_maintenance_failures_total",
        "Maintenance tasks that ended in an error"
    );
    describe_counter!(
        "rolegate_maintenance_dropped_total",
        "Maintenance tasks not enqueued because the queue was full or closed"
    );
}

/// Record a permission check
pub fn record_check(allowed: bool, duration_seconds: f64) {
    counter!("rolegate_checks_total").increment(1);
    if allowed {
        counter!("rolegate_checks_allowed_total").increment(1);
    } else {
        counter!("rolegate_checks_denied_total").increment(1);
    }
    histogram!("rolegate_check_duration_seconds").record(duration_seconds);
}

pub fn record_roles_skipped(count: usize) {
    if count > 0 {
        counter!("rolegate_roles_skipped_total").increment(count as u64);
    }
}

/// Record whether a cached check found an effective-permission record
pub fn record_effective_lookup(hit: bool) {
    if hit {
        counter!("rolegate_effective_hits_total").increment(1);
    } else {
        counter!("rolegate_effective_misses_total").increment(1);
    }
}

/// Record an entity deletion; `path` is `transaction`, `inline_sweep` or `deferred`
pub fn record_cascade_delete(kind: &str, path: &'static str, edges: usize) {
    counter!("rolegate_cascade_deletes_total", "kind" => kind.to_string(), "path" => path)
        .increment(1);
    counter!("rolegate_cascade_edges_removed_total").increment(edges as u64);
}

pub fn record_maintenance_task(task: &'static str, success: bool) {
    counter!("rolegate_maintenance_tasks_total", "task" => task).increment(1);
    if !success {
        counter!("rolegate_maintenance_failures_total", "task" => task).increment(1);
    }
}

pub fn record_maintenance_dropped(task: &'static str) {
    counter!("rolegate_maintenance_dropped_total", "task" => task).increment(1);
}
