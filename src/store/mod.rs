//! Store adapter: the shared, network-accessible state behind the broker.
//!
//! The broker never reads and then writes to move a task. Every queue
//! transition is expressed as a [`Transition`] and handed to
//! [`Store::transition`], which implementations must apply as one indivisible
//! step. This keeps the atomicity contract in one place for every operation.
//!
//! List semantics follow Redis: `push` inserts on the left, pops take from the
//! right, so a list behaves as a FIFO where new members enter on the left.
//!
//! # Implementations
//!
//! - [`RedisStore`]: production store; each transition runs as one Lua script
//! - [`MemoryStore`]: in-process store with the same semantics

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// A sorted-set member with its score.
pub type ScoredEntry = (String, f64);

/// Trimming applied to a sorted set right after an insert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trim {
    /// Remove entries scored strictly below this value.
    pub min_score: Option<f64>,
    /// Then keep only this many highest-scored entries.
    pub max_len: Option<usize>,
}

/// Where a member removed from a list ends up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement<'a> {
    /// Nowhere: the member leaves the store.
    Discard,
    /// Into a sorted set with the given score.
    Scored {
        set: &'a str,
        score: f64,
        trim: Option<Trim>,
    },
}

/// A multi-key move applied atomically by [`Store::transition`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition<'a> {
    /// Remove one occurrence of `member` from list `from` and place it.
    ///
    /// The placement is applied even when `member` was absent from `from`.
    /// Yields the number of occurrences removed (0 or 1).
    Member {
        from: &'a str,
        member: &'a str,
        to: Placement<'a>,
    },
    /// Move every member of list `from` onto list `to`.
    ///
    /// Yields the number of members moved.
    Drain { from: &'a str, to: &'a str },
    /// Move every member of sorted set `from` scored at or below `max_score`
    /// onto list `to`. A member is pushed only if this transition removed it.
    ///
    /// Yields the number of members promoted.
    Due {
        from: &'a str,
        max_score: f64,
        to: &'a str,
    },
}

/// Capability interface over the shared store.
///
/// Implementations must be safe to share between tasks and processes: many
/// brokers may operate on the same keys concurrently.
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts `member` on the left of `list`.
    async fn push(&self, list: &str, member: &str) -> Result<(), StoreError>;

    /// Inserts or re-scores `member` in sorted set `set`.
    async fn add_scored(&self, set: &str, member: &str, score: f64) -> Result<(), StoreError>;

    /// Atomically pops the right end of `from` and pushes it on the left of
    /// `to`, waiting up to `timeout` for `from` to become non-empty.
    ///
    /// Returns `None` if nothing arrived before the timeout.
    async fn blocking_move(
        &self,
        from: &str,
        to: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError>;

    /// Applies `transition` as one atomic step.
    async fn transition(&self, transition: &Transition<'_>) -> Result<u64, StoreError>;

    /// Returns the members of `list`, left to right.
    async fn list_range(&self, list: &str) -> Result<Vec<String>, StoreError>;

    /// Returns the members of `set` with scores, ascending by score.
    async fn scored_range(&self, set: &str) -> Result<Vec<ScoredEntry>, StoreError>;

    async fn list_len(&self, list: &str) -> Result<usize, StoreError>;

    async fn scored_len(&self, set: &str) -> Result<usize, StoreError>;
}
