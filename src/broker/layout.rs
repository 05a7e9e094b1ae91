//! Store key layout for the five broker collections.

use serde::{Deserialize, Serialize};

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "taskbroker";

/// The five collections a task can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// FIFO list of tasks ready for delivery.
    Pending,
    /// List of tasks claimed by a worker.
    InProgress,
    /// Sorted set scored by first processing time.
    Scheduled,
    /// Sorted set scored by next retry time.
    Retry,
    /// Sorted set scored by time of death.
    Dead,
}

impl QueueKind {
    /// All collections, in lifecycle order.
    pub const ALL: [QueueKind; 5] = [
        QueueKind::Pending,
        QueueKind::InProgress,
        QueueKind::Scheduled,
        QueueKind::Retry,
        QueueKind::Dead,
    ];

    /// Returns whether the collection is a score-ordered set.
    pub fn is_scored(&self) -> bool {
        matches!(self, QueueKind::Scheduled | QueueKind::Retry | QueueKind::Dead)
    }

    /// Short name used in logs, metrics labels and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Pending => "pending",
            QueueKind::InProgress => "in_progress",
            QueueKind::Scheduled => "scheduled",
            QueueKind::Retry => "retry",
            QueueKind::Dead => "dead",
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" | "default" => Ok(QueueKind::Pending),
            "in_progress" | "in-progress" => Ok(QueueKind::InProgress),
            "scheduled" => Ok(QueueKind::Scheduled),
            "retry" => Ok(QueueKind::Retry),
            "dead" => Ok(QueueKind::Dead),
            other => Err(format!(
                "unknown queue '{}': expected pending, in_progress, scheduled, retry or dead",
                other
            )),
        }
    }
}

/// Resolved store keys for one broker namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLayout {
    namespace: String,
    pending: String,
    in_progress: String,
    scheduled: String,
    retry: String,
    dead: String,
}

impl QueueLayout {
    /// Builds the key layout under `namespace`.
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            pending: format!("{}:queues:default", namespace),
            in_progress: format!("{}:in_progress", namespace),
            scheduled: format!("{}:scheduled", namespace),
            retry: format!("{}:retry", namespace),
            dead: format!("{}:dead", namespace),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the store key of a collection.
    pub fn key(&self, kind: QueueKind) -> &str {
        match kind {
            QueueKind::Pending => &self.pending,
            QueueKind::InProgress => &self.in_progress,
            QueueKind::Scheduled => &self.scheduled,
            QueueKind::Retry => &self.retry,
            QueueKind::Dead => &self.dead,
        }
    }
}

impl Default for QueueLayout {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}
