//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by taskbroker and provides
//! functions for initializing, registering, and exporting them.

use prometheus::{Counter, CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all taskbroker metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Broker operations, labeled by operation and outcome (ok/error).
pub static OPERATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Tasks moved into pending by a sweep, labeled by source set.
pub static TASKS_PROMOTED: OnceLock<CounterVec> = OnceLock::new();

/// Tasks moved from in-progress back to pending by recovery.
pub static TASKS_RESTORED: OnceLock<Counter> = OnceLock::new();

/// Dequeues that found nothing before their timeout.
pub static DEQUEUE_TIMEOUTS: OnceLock<Counter> = OnceLock::new();

/// Number of entries per collection, labeled by queue.
pub static QUEUE_DEPTH: OnceLock<GaugeVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at application startup. Later calls leave the first
/// registration in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let operations_total = CounterVec::new(
        Opts::new("taskbroker_operations_total", "Total broker operations"),
        &["operation", "outcome"],
    )?;

    let tasks_promoted = CounterVec::new(
        Opts::new(
            "taskbroker_tasks_promoted_total",
            "Tasks promoted from scheduled or retry into pending",
        ),
        &["source"],
    )?;

    let tasks_restored = Counter::new(
        "taskbroker_tasks_restored_total",
        "Tasks restored from in-progress into pending",
    )?;

    let dequeue_timeouts = Counter::new(
        "taskbroker_dequeue_timeouts_total",
        "Dequeues that timed out on an empty pending queue",
    )?;

    let queue_depth = GaugeVec::new(
        Opts::new("taskbroker_queue_depth", "Number of entries per queue"),
        &["queue"],
    )?;

    registry.register(Box::new(operations_total.clone()))?;
    registry.register(Box::new(tasks_promoted.clone()))?;
    registry.register(Box::new(tasks_restored.clone()))?;
    registry.register(Box::new(dequeue_timeouts.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = OPERATIONS_TOTAL.set(operations_total);
    let _ = TASKS_PROMOTED.set(tasks_promoted);
    let _ = TASKS_RESTORED.set(tasks_restored);
    let _ = DEQUEUE_TIMEOUTS.set(dequeue_timeouts);
    let _ = QUEUE_DEPTH.set(queue_depth);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// If the registry has not been initialized or encoding fails, returns a
/// comment line describing the problem.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
