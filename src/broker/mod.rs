//! Durable task lifecycle on top of a shared store.
//!
//! - **TaskMessage**: the unit of work, encoded as JSON in every collection
//! - **QueueLayout**: the five store keys a broker operates on
//! - **Broker**: the lifecycle operations moving tasks between collections
//!
//! # Architecture
//!
//! ```text
//!    ┌──────────┐    ┌──────────┐    ┌──────────┐
//!    │ Producer │    │ Worker 1 │    │ Worker N │
//!    └────┬─────┘    └────┬─────┘    └────┬─────┘
//!         │               │               │
//!         └───────────────┼───────────────┘
//!                         │ Broker
//!                  ┌──────▼───────┐
//!                  │    Redis     │
//!                  │ pending      │
//!                  │ in_progress  │
//!                  │ scheduled    │
//!                  │ retry        │
//!                  │ dead         │
//!                  └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use taskbroker::broker::{Broker, BrokerConfig, TaskMessage};
//! use std::time::Duration;
//!
//! let broker = Broker::connect(&BrokerConfig::default()).await?;
//!
//! broker.enqueue(&TaskMessage::new("send_email", None)).await?;
//!
//! let task = broker.dequeue(Duration::from_secs(1)).await?;
//! broker.done(&task).await?;
//! ```

pub mod config;
pub mod layout;
pub mod lifecycle;
pub mod message;

pub use config::{BrokerConfig, DeadRetention};
pub use layout::{QueueKind, QueueLayout, DEFAULT_NAMESPACE};
pub use lifecycle::{Broker, QueueStats};
pub use message::{Payload, TaskMessage};
