//! Metrics module for Prometheus-based monitoring.
//!
//! # Example
//!
//! ```ignore
//! use taskbroker::metrics::{init_metrics, export_metrics};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! // ... run broker operations ...
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use self::collectors::MetricsCollector;
pub use self::prometheus::{export_metrics, init_metrics};

pub use self::prometheus::{
    DEQUEUE_TIMEOUTS, OPERATIONS_TOTAL, QUEUE_DEPTH, REGISTRY, TASKS_PROMOTED, TASKS_RESTORED,
};
