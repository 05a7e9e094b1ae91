//! Metric recording for broker operations.
//!
//! `MetricsCollector` wraps the raw Prometheus statics. Every method is a
//! no-op until [`init_metrics`](super::init_metrics) has run, so library users
//! that never export metrics pay nothing beyond an atomic load.

use super::prometheus::{
    DEQUEUE_TIMEOUTS, OPERATIONS_TOTAL, QUEUE_DEPTH, TASKS_PROMOTED, TASKS_RESTORED,
};

/// Records taskbroker operational metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record the outcome of a broker operation.
    ///
    /// # Arguments
    ///
    /// * `operation` - Operation name (e.g., "enqueue", "kill")
    /// * `success` - Whether the operation returned without error
    pub fn record_operation(&self, operation: &str, success: bool) {
        let outcome = if success { "ok" } else { "error" };

        if let Some(operations) = OPERATIONS_TOTAL.get() {
            operations.with_label_values(&[operation, outcome]).inc();
        }

        tracing::trace!(
            operation = operation,
            outcome = outcome,
            "Recorded operation metric"
        );
    }

    /// Record tasks promoted into pending from `source` ("scheduled" or "retry").
    pub fn record_promoted(&self, source: &str, count: u64) {
        if count == 0 {
            return;
        }
        if let Some(promoted) = TASKS_PROMOTED.get() {
            promoted.with_label_values(&[source]).inc_by(count as f64);
        }
    }

    /// Record tasks restored from in-progress.
    pub fn record_restored(&self, count: u64) {
        if let Some(restored) = TASKS_RESTORED.get() {
            restored.inc_by(count as f64);
        }
    }

    pub fn record_dequeue_timeout(&self) {
        if let Some(timeouts) = DEQUEUE_TIMEOUTS.get() {
            timeouts.inc();
        }
    }

    /// Update the depth gauge for a queue.
    pub fn update_queue_depth(&self, queue: &str, depth: usize) {
        if let Some(queue_depth) = QUEUE_DEPTH.get() {
            queue_depth.with_label_values(&[queue]).set(depth as f64);
        }

        tracing::trace!(queue = queue, depth = depth, "Updated queue depth metric");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    #[test]
    fn test_metrics_collector_new() {
        let collector = MetricsCollector::new();
        assert!(std::mem::size_of_val(&collector) == 0);
    }

    #[test]
    fn test_recording_does_not_panic() {
        let _ = init_metrics();
        let collector = MetricsCollector::new();

        collector.record_operation("kill", true);
        collector.record_operation("kill", false);
        collector.record_promoted("scheduled", 3);
        collector.record_promoted("retry", 0);
        collector.record_restored(2);
        collector.record_dequeue_timeout();
        collector.update_queue_depth("pending", 7);

        let metrics = export_metrics();
        assert!(metrics.contains("taskbroker_queue_depth"));
        assert!(metrics.contains("taskbroker_tasks_promoted_total"));
    }
}
