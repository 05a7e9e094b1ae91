//! Redis-backed store.
//!
//! Every [`Transition`] runs as a single Lua script, which Redis executes
//! without interleaving other commands. Single-key operations use plain
//! commands. Blocking pops (`BRPOPLPUSH`) run on dedicated connections so a
//! waiting worker never stalls commands multiplexed on the shared connection.

use std::time::Duration;

use ::redis::aio::{ConnectionManager, MultiplexedConnection};
use ::redis::{AsyncCommands, Script};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Placement, ScoredEntry, Store, Transition, Trim};
use crate::error::StoreError;

const MOVE_TO_SCORED_LUA: &str = include_str!("lua/move_to_scored.lua");
const DRAIN_LUA: &str = include_str!("lua/drain.lua");
const PROMOTE_DUE_LUA: &str = include_str!("lua/promote_due.lua");

/// Upper bound on idle blocking connections kept for reuse.
const MAX_IDLE_BLOCKING: usize = 16;

/// Formats a score the way Redis parses it back.
fn format_score(score: f64) -> String {
    format!("{}", score)
}

/// Script arguments for an optional trim: (min score, max length), "" when unset.
fn trim_args(trim: Option<&Trim>) -> (String, String) {
    let min_score = trim
        .and_then(|t| t.min_score)
        .map(format_score)
        .unwrap_or_default();
    let max_len = trim
        .and_then(|t| t.max_len)
        .map(|n| n.to_string())
        .unwrap_or_default();
    (min_score, max_len)
}

/// Whole seconds to pass to `BRPOPLPUSH`, rounded up and never 0 (which
/// would block forever).
fn blocking_timeout_secs(timeout: Duration) -> u64 {
    let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    millis.div_ceil(1000).max(1)
}

/// Redis implementation of [`Store`].
pub struct RedisStore {
    client: ::redis::Client,
    /// Shared connection (handles reconnection automatically).
    conn: ConnectionManager,
    /// Idle connections reserved for blocking commands.
    blocking: Mutex<Vec<MultiplexedConnection>>,
    move_to_scored_script: Script,
    drain_script: Script,
    promote_due_script: Script,
}

impl RedisStore {
    /// Connects to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(redis_url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(client, conn))
    }

    /// Creates a store from an existing client and connection manager.
    ///
    /// Useful when sharing a connection with other components.
    pub fn from_connection(client: ::redis::Client, conn: ConnectionManager) -> Self {
        Self {
            client,
            conn,
            blocking: Mutex::new(Vec::new()),
            move_to_scored_script: Script::new(MOVE_TO_SCORED_LUA),
            drain_script: Script::new(DRAIN_LUA),
            promote_due_script: Script::new(PROMOTE_DUE_LUA),
        }
    }

    /// Deletes the given keys. Intended for tests and administrative resets.
    pub async fn clear(&self, keys: &[&str]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = ::redis::pipe();
        for key in keys {
            pipe.del(*key);
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn checkout_blocking(&self) -> Result<MultiplexedConnection, StoreError> {
        if let Some(conn) = self.blocking.lock().await.pop() {
            return Ok(conn);
        }
        debug!("Opening dedicated Redis connection for blocking commands");
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))
    }

    async fn checkin_blocking(&self, conn: MultiplexedConnection) {
        let mut idle = self.blocking.lock().await;
        if idle.len() < MAX_IDLE_BLOCKING {
            idle.push(conn);
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn push(&self, list: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(list, member).await?;
        Ok(())
    }

    async fn add_scored(&self, set: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(set, member, score).await?;
        Ok(())
    }

    async fn blocking_move(
        &self,
        from: &str,
        to: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.checkout_blocking().await?;

        // BRPOPLPUSH atomically pops from source and pushes to destination
        let result: Option<String> = ::redis::cmd("BRPOPLPUSH")
            .arg(from)
            .arg(to)
            .arg(blocking_timeout_secs(timeout))
            .query_async(&mut conn)
            .await?;

        // Connections that errored are dropped by the `?` above.
        self.checkin_blocking(conn).await;
        Ok(result)
    }

    async fn transition(&self, transition: &Transition<'_>) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = match *transition {
            Transition::Member {
                from,
                member,
                to: Placement::Discard,
            } => conn.lrem(from, 1, member).await?,
            Transition::Member {
                from,
                member,
                to: Placement::Scored { set, score, trim },
            } => {
                let (min_score, max_len) = trim_args(trim.as_ref());
                self.move_to_scored_script
                    .key(from)
                    .key(set)
                    .arg(member)
                    .arg(format_score(score))
                    .arg(min_score)
                    .arg(max_len)
                    .invoke_async(&mut conn)
                    .await?
            }
            Transition::Drain { from, to } => {
                self.drain_script
                    .key(from)
                    .key(to)
                    .invoke_async(&mut conn)
                    .await?
            }
            Transition::Due {
                from,
                max_score,
                to,
            } => {
                self.promote_due_script
                    .key(from)
                    .key(to)
                    .arg(format_score(max_score))
                    .invoke_async(&mut conn)
                    .await?
            }
        };
        Ok(count)
    }

    async fn list_range(&self, list: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.lrange(list, 0, -1).await?;
        Ok(members)
    }

    async fn scored_range(&self, set: &str) -> Result<Vec<ScoredEntry>, StoreError> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, f64)> = conn.zrange_withscores(set, 0, -1).await?;
        Ok(entries)
    }

    async fn list_len(&self, list: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(list).await?;
        Ok(len)
    }

    async fn scored_len(&self, set: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.zcard(set).await?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(1_700_000_000.0), "1700000000");
        assert_eq!(format_score(-1.0), "-1");
        assert_eq!(format_score(12.5), "12.5");
    }

    #[test]
    fn test_trim_args() {
        assert_eq!(trim_args(None), (String::new(), String::new()));

        let trim = Trim {
            min_score: Some(100.0),
            max_len: None,
        };
        assert_eq!(trim_args(Some(&trim)), ("100".to_string(), String::new()));

        let trim = Trim {
            min_score: None,
            max_len: Some(500),
        };
        assert_eq!(trim_args(Some(&trim)), (String::new(), "500".to_string()));
    }

    #[test]
    fn test_blocking_timeout_secs() {
        assert_eq!(blocking_timeout_secs(Duration::ZERO), 1);
        assert_eq!(blocking_timeout_secs(Duration::from_millis(200)), 1);
        assert_eq!(blocking_timeout_secs(Duration::from_secs(2)), 2);
        assert_eq!(blocking_timeout_secs(Duration::from_millis(2001)), 3);
        assert_eq!(blocking_timeout_secs(Duration::MAX), u64::MAX.div_ceil(1000));
    }

    #[test]
    fn test_scripts_reference_expected_commands() {
        assert!(MOVE_TO_SCORED_LUA.contains("LREM"));
        assert!(MOVE_TO_SCORED_LUA.contains("ZADD"));
        assert!(DRAIN_LUA.contains("RPOPLPUSH"));
        assert!(PROMOTE_DUE_LUA.contains("ZREM"));
        assert!(PROMOTE_DUE_LUA.contains("LPUSH"));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = RedisStore::connect("not-a-redis-url").await;
        assert!(matches!(result, Err(StoreError::ConnectionFailed(_))));
    }
}
