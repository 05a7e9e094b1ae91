//! Error types for taskbroker operations.
//!
//! Three error families, one per layer:
//! - Store adapter failures (connection, transaction, injected outages)
//! - Broker operation results (dequeue timeout, store and codec failures)
//! - Configuration loading and validation

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a [`Store`](crate::store::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by [`Broker`](crate::broker::Broker) operations.
///
/// `DequeueTimeout` is the expected "nothing to do yet" outcome of a dequeue
/// and should not be treated as a fault by callers.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Dequeue timed out after {0:?} with no pending task")]
    DequeueTimeout(Duration),

    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("Task message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue '{0}' is not a scored set")]
    NotScored(String),
}

impl BrokerError {
    /// Returns true for the idle-queue outcome of a dequeue.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrokerError::DequeueTimeout(_))
    }
}

/// Errors that can occur while loading broker configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
