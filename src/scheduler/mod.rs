//! Scheduler sweep: the timer that drives due-task promotion.
//!
//! ```text
//!    ┌───────────┐   every interval   ┌────────┐
//!    │  Sweeper  │ ─────────────────► │ Broker │ check_and_enqueue()
//!    └───────────┘                    └───┬────┘
//!          │ once at start                │
//!          └── restore_unfinished() ──────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use taskbroker::scheduler::{Sweeper, SweeperConfig};
//!
//! let mut sweeper = Sweeper::new(broker, SweeperConfig::from(&config));
//! sweeper.start().await?;
//! // ...
//! sweeper.shutdown().await?;
//! ```

pub mod sweeper;

pub use sweeper::{SweepError, SweepStats, Sweeper, SweeperConfig};
