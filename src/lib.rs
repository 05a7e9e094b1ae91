//! taskbroker: durable task queue broker backed by Redis.
//!
//! Tasks move between five collections (pending, in-progress, scheduled,
//! retry and dead) through atomic store transitions, so a task is never lost
//! or duplicated when workers crash or sweeps race.

pub mod broker;
pub mod cli;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod store;

pub use broker::{Broker, BrokerConfig, QueueKind, QueueStats, TaskMessage};
pub use error::{BrokerError, ConfigError, StoreError};
pub use store::{MemoryStore, RedisStore, Store};
