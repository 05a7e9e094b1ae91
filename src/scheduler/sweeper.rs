//! Periodic promotion of due tasks.
//!
//! The sweeper calls [`Broker::check_and_enqueue`] on a fixed interval from a
//! background tokio task. It can also run [`Broker::restore_unfinished`] once
//! at start, which is the recovery step a host runs after a crash.
//!
//! Any number of sweepers may run against the same store. Each due entry is
//! promoted by exactly one of them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, BrokerConfig};
use crate::error::BrokerError;

/// Errors that can occur while starting or stopping a sweeper.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Sweeper is already running")]
    AlreadyRunning,

    #[error("Sweeper is not running")]
    NotRunning,

    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Broker operation failed: {0}")]
    Broker(#[from] BrokerError),
}

/// Configuration for a [`Sweeper`].
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Restore in-progress tasks to pending before the first sweep.
    pub recover_on_start: bool,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            recover_on_start: true,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl SweeperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_recover_on_start(mut self, recover: bool) -> Self {
        self.recover_on_start = recover;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl From<&BrokerConfig> for SweeperConfig {
    fn from(config: &BrokerConfig) -> Self {
        Self::default()
            .with_interval(config.sweep_interval())
            .with_recover_on_start(config.recover_on_start)
    }
}

/// Counters for the sweeps a [`Sweeper`] has run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub sweeps_run: u64,
    pub sweeps_failed: u64,
    pub tasks_promoted: u64,
    pub tasks_restored: u64,
}

struct SharedSweepStats {
    sweeps_run: AtomicU64,
    sweeps_failed: AtomicU64,
    tasks_promoted: AtomicU64,
    tasks_restored: AtomicU64,
}

impl SharedSweepStats {
    fn new() -> Self {
        Self {
            sweeps_run: AtomicU64::new(0),
            sweeps_failed: AtomicU64::new(0),
            tasks_promoted: AtomicU64::new(0),
            tasks_restored: AtomicU64::new(0),
        }
    }

    fn record_sweep(&self, promoted: usize) {
        self.sweeps_run.fetch_add(1, Ordering::SeqCst);
        self.tasks_promoted
            .fetch_add(promoted as u64, Ordering::SeqCst);
    }

    fn record_failure(&self) {
        self.sweeps_run.fetch_add(1, Ordering::SeqCst);
        self.sweeps_failed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_restored(&self, restored: usize) {
        self.tasks_restored
            .fetch_add(restored as u64, Ordering::SeqCst);
    }

    fn snapshot(&self) -> SweepStats {
        SweepStats {
            sweeps_run: self.sweeps_run.load(Ordering::SeqCst),
            sweeps_failed: self.sweeps_failed.load(Ordering::SeqCst),
            tasks_promoted: self.tasks_promoted.load(Ordering::SeqCst),
            tasks_restored: self.tasks_restored.load(Ordering::SeqCst),
        }
    }
}

/// Background invoker of [`Broker::check_and_enqueue`].
pub struct Sweeper {
    config: SweeperConfig,
    broker: Arc<Broker>,
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<SharedSweepStats>,
    is_running: AtomicBool,
}

impl Sweeper {
    pub fn new(broker: Arc<Broker>, config: SweeperConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            broker,
            shutdown_tx,
            handle: None,
            stats: Arc::new(SharedSweepStats::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Starts the sweep loop.
    ///
    /// When `recover_on_start` is set, in-progress tasks are restored first.
    /// A failed recovery is logged and the loop starts anyway.
    ///
    /// # Errors
    ///
    /// Returns `SweepError::AlreadyRunning` if the loop is already running.
    pub async fn start(&mut self) -> Result<(), SweepError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(SweepError::AlreadyRunning);
        }

        if self.config.recover_on_start {
            if let Err(e) = self.recover().await {
                warn!(error = %e, "Failed to restore unfinished tasks");
            }
        }

        let broker = Arc::clone(&self.broker);
        let stats = Arc::clone(&self.stats);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let interval = self.config.interval;

        self.handle = Some(tokio::spawn(async move {
            sweep_loop(broker, stats, shutdown_rx, interval).await;
        }));

        self.is_running.store(true, Ordering::SeqCst);
        info!(interval = ?interval, "Sweeper started");

        Ok(())
    }

    /// Stops the sweep loop, letting an in-flight sweep finish.
    ///
    /// # Errors
    ///
    /// - `SweepError::NotRunning` if the loop was never started
    /// - `SweepError::ShutdownTimeout` if the loop did not stop in time
    pub async fn shutdown(&mut self) -> Result<(), SweepError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SweepError::NotRunning);
        }

        info!("Initiating sweeper shutdown");
        let _ = self.shutdown_tx.send(());

        let result = match self.handle.take() {
            Some(handle) => tokio::time::timeout(self.config.shutdown_timeout, handle).await,
            None => Ok(Ok(())),
        };
        self.is_running.store(false, Ordering::SeqCst);

        match result {
            Ok(Ok(())) => {
                info!("Sweeper shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Sweep task panicked during shutdown");
                Ok(())
            }
            Err(_) => Err(SweepError::ShutdownTimeout(self.config.shutdown_timeout)),
        }
    }

    /// Runs a single sweep in the calling task.
    pub async fn run_once(&self) -> Result<usize, SweepError> {
        sweep(&self.broker, &self.stats).await.map_err(Into::into)
    }

    /// Restores in-progress tasks to pending once.
    pub async fn recover(&self) -> Result<usize, SweepError> {
        let restored = self.broker.restore_unfinished().await?;
        self.stats.record_restored(restored);
        Ok(restored)
    }

    pub fn stats(&self) -> SweepStats {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }
}

async fn sweep(broker: &Broker, stats: &SharedSweepStats) -> Result<usize, BrokerError> {
    match broker.check_and_enqueue().await {
        Ok(promoted) => {
            stats.record_sweep(promoted);
            Ok(promoted)
        }
        Err(e) => {
            stats.record_failure();
            Err(e)
        }
    }
}

async fn sweep_loop(
    broker: Arc<Broker>,
    stats: Arc<SharedSweepStats>,
    mut shutdown_rx: broadcast::Receiver<()>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Sweep loop received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = sweep(&broker, &stats).await {
                    error!(error = %e, "Sweep failed");
                }
            }
        }
    }

    info!("Sweep loop stopped");
}
