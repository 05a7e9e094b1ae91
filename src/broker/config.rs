//! Broker configuration.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::layout::{QueueLayout, DEFAULT_NAMESPACE};
use crate::error::ConfigError;
use crate::store::Trim;

/// Retention policy applied to the dead set on every kill.
///
/// Both limits are opt-in. With neither set the dead set is never trimmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadRetention {
    /// Drop dead entries older than this many seconds.
    #[serde(default)]
    pub max_age_secs: Option<u64>,
    /// Keep at most this many of the most recently killed entries.
    #[serde(default)]
    pub max_len: Option<usize>,
}

impl DeadRetention {
    /// No trimming.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age_secs = Some(max_age.as_secs());
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    /// Resolves the policy into a store-level trim relative to `now`.
    pub fn trim_at(&self, now: DateTime<Utc>) -> Option<Trim> {
        if self.max_age_secs.is_none() && self.max_len.is_none() {
            return None;
        }
        let min_score = self
            .max_age_secs
            .map(|age| now.timestamp().saturating_sub(age.min(i64::MAX as u64) as i64) as f64);
        // The entry just inserted always survives.
        Some(Trim {
            min_score,
            max_len: self.max_len.map(|n| n.max(1)),
        })
    }
}

/// Configuration for a broker and the processes driving it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Redis connection URL.
    pub redis_url: String,
    /// Prefix for all store keys.
    pub namespace: String,
    /// Dead set trimming policy.
    pub dead_retention: DeadRetention,
    /// Interval between scheduler sweeps, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Whether a sweeper restores in-progress tasks when it starts.
    pub recover_on_start: bool,
    /// Default wait for a dequeue, in milliseconds.
    pub dequeue_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            dead_retention: DeadRetention::unbounded(),
            sweep_interval_ms: 1000,
            recover_on_start: true,
            dequeue_timeout_ms: 1000,
        }
    }
}

impl BrokerConfig {
    /// Loads configuration from a YAML file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parses configuration from a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: BrokerConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the broker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".to_string()));
        }
        if self.redis_url.trim().is_empty() {
            return Err(ConfigError::Invalid("redis_url must not be empty".to_string()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.dead_retention.max_len == Some(0) {
            return Err(ConfigError::Invalid(
                "dead_retention.max_len must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Sets the key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the dead set retention policy.
    pub fn with_dead_retention(mut self, retention: DeadRetention) -> Self {
        self.dead_retention = retention;
        self
    }

    /// Sets the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets whether sweepers recover in-progress tasks on start.
    pub fn with_recover_on_start(mut self, recover: bool) -> Self {
        self.recover_on_start = recover;
        self
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    /// Key layout derived from the namespace.
    pub fn layout(&self) -> QueueLayout {
        QueueLayout::new(&self.namespace)
    }
}
