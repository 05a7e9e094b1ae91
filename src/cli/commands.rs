//! CLI command definitions for taskbroker.
//!
//! Each subcommand connects a [`Broker`] to the configured Redis and runs one
//! lifecycle operation, or the scheduler sweep loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::info;

use crate::broker::{Broker, BrokerConfig, Payload, QueueKind, TaskMessage};
use crate::metrics::export_metrics;
use crate::scheduler::{Sweeper, SweeperConfig};

/// Durable task queue broker backed by Redis.
#[derive(Parser)]
#[command(name = "taskbroker")]
#[command(about = "Enqueue, inspect and sweep durable Redis task queues")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// YAML configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Redis connection URL (overrides the config file).
    #[arg(long, env = "TASKBROKER_REDIS_URL", global = true)]
    pub redis_url: Option<String>,

    /// Key namespace (overrides the config file).
    #[arg(long, env = "TASKBROKER_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Add a task to pending, or schedule it for later.
    Enqueue(EnqueueArgs),

    /// Claim the next pending task and print it as JSON.
    Dequeue(DequeueArgs),

    /// Promote due scheduled and retry tasks into pending.
    Sweep(SweepArgs),

    /// Move every in-progress task back to pending.
    Recover,

    /// Show the size of every queue.
    Stats(StatsArgs),

    /// List the tasks in a queue.
    #[command(alias = "ls")]
    List(ListArgs),
}

/// Arguments for `taskbroker enqueue`.
#[derive(Parser, Debug)]
pub struct EnqueueArgs {
    /// Task type (the handler name).
    pub task_type: String,

    /// Payload as a JSON object.
    #[arg(short, long)]
    pub payload: Option<String>,

    /// Process at this RFC 3339 time instead of now.
    #[arg(long, conflicts_with = "in_secs")]
    pub at: Option<DateTime<Utc>>,

    /// Process this many seconds from now instead of now.
    #[arg(long = "in", value_name = "SECS")]
    pub in_secs: Option<u64>,
}

/// Arguments for `taskbroker dequeue`.
#[derive(Parser, Debug)]
pub struct DequeueArgs {
    /// How long to wait for a task, in milliseconds (default from config).
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,
}

/// Arguments for `taskbroker sweep`.
#[derive(Parser, Debug)]
pub struct SweepArgs {
    /// Run a single sweep and exit.
    #[arg(long)]
    pub once: bool,
}

/// Arguments for `taskbroker stats`.
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Output JSON.
    #[arg(short = 'j', long, conflicts_with = "metrics")]
    pub json: bool,

    /// Output Prometheus text format.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for `taskbroker list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Queue to list (pending, in_progress, scheduled, retry, dead).
    pub queue: QueueKind,

    /// Maximum number of tasks to print.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Enqueue(args) => run_enqueue_command(&config, args).await,
        Commands::Dequeue(args) => run_dequeue_command(&config, args).await,
        Commands::Sweep(args) => run_sweep_command(&config, args).await,
        Commands::Recover => run_recover_command(&config).await,
        Commands::Stats(args) => run_stats_command(&config, args).await,
        Commands::List(args) => run_list_command(&config, args).await,
    }
}

/// Loads the config file if given, then applies flag and env overrides.
fn resolve_config(cli: &Cli) -> anyhow::Result<BrokerConfig> {
    let mut config = match &cli.config {
        Some(path) => BrokerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BrokerConfig::default(),
    };

    if let Some(url) = &cli.redis_url {
        config = config.with_redis_url(url);
    }
    if let Some(namespace) = &cli.namespace {
        config = config.with_namespace(namespace);
    }

    config.validate()?;
    Ok(config)
}

async fn connect(config: &BrokerConfig) -> anyhow::Result<Broker> {
    Broker::connect(config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.redis_url))
}

/// Parses a `--payload` argument, which must be a JSON object.
fn parse_payload(raw: &str) -> anyhow::Result<Payload> {
    let value: serde_json::Value = serde_json::from_str(raw).context("Payload is not valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => anyhow::bail!("Payload must be a JSON object, got: {}", other),
    }
}

/// Resolves `--at`/`--in` into a processing time. `None` means now.
fn process_at(
    args: &EnqueueArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<DateTime<Utc>>> {
    if let Some(at) = args.at {
        return Ok(Some(at));
    }
    let Some(secs) = args.in_secs else {
        return Ok(None);
    };

    let at = i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|delay| now.checked_add_signed(delay));
    match at {
        Some(at) => Ok(Some(at)),
        None => anyhow::bail!("--in {} is too far in the future", secs),
    }
}

async fn run_enqueue_command(config: &BrokerConfig, args: EnqueueArgs) -> anyhow::Result<()> {
    let payload = args.payload.as_deref().map(parse_payload).transpose()?;
    let task = TaskMessage::new(args.task_type.clone(), payload);
    let at = process_at(&args, Utc::now())?;
    let broker = connect(config).await?;

    match at {
        Some(at) => {
            broker.schedule(&task, at).await?;
            println!("Scheduled {} for {}", task, at.to_rfc3339());
        }
        None => {
            broker.enqueue(&task).await?;
            println!("Enqueued {}", task);
        }
    }
    Ok(())
}

async fn run_dequeue_command(config: &BrokerConfig, args: DequeueArgs) -> anyhow::Result<()> {
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.dequeue_timeout());
    let broker = connect(config).await?;

    match broker.dequeue(timeout).await {
        Ok(task) => {
            println!("{}", serde_json::to_string_pretty(&task)?);
            Ok(())
        }
        Err(e) if e.is_timeout() => {
            eprintln!("No pending task within {:?}", timeout);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_sweep_command(config: &BrokerConfig, args: SweepArgs) -> anyhow::Result<()> {
    let broker = Arc::new(connect(config).await?);
    let mut sweeper = Sweeper::new(broker, SweeperConfig::from(config));

    if args.once {
        if config.recover_on_start {
            let restored = sweeper.recover().await?;
            println!("Restored {} unfinished task(s)", restored);
        }
        let promoted = sweeper.run_once().await?;
        println!("Promoted {} task(s)", promoted);
        return Ok(());
    }

    sweeper.start().await?;
    info!(namespace = %config.namespace, "Sweeping; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    sweeper.shutdown().await?;
    let stats = sweeper.stats();
    info!(
        sweeps = stats.sweeps_run,
        failed = stats.sweeps_failed,
        promoted = stats.tasks_promoted,
        restored = stats.tasks_restored,
        "Sweeper stopped"
    );
    Ok(())
}

async fn run_recover_command(config: &BrokerConfig) -> anyhow::Result<()> {
    let broker = connect(config).await?;
    let restored = broker.restore_unfinished().await?;
    println!("Restored {} unfinished task(s)", restored);
    Ok(())
}

async fn run_stats_command(config: &BrokerConfig, args: StatsArgs) -> anyhow::Result<()> {
    let broker = connect(config).await?;
    let stats = broker.stats().await?;

    if args.metrics {
        print!("{}", export_metrics());
    } else if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Namespace: {}", config.namespace);
        for kind in QueueKind::ALL {
            println!("  {:<12} {}", kind.as_str(), stats.get(kind));
        }
        println!("  {:<12} {}", "total", stats.total());
    }
    Ok(())
}

async fn run_list_command(config: &BrokerConfig, args: ListArgs) -> anyhow::Result<()> {
    let broker = connect(config).await?;
    let limit = args.limit.unwrap_or(usize::MAX);

    if args.queue.is_scored() {
        for (task, at) in broker.list_scored(args.queue).await?.into_iter().take(limit) {
            println!("{}  {}", at.to_rfc3339(), serde_json::to_string(&task)?);
        }
    } else {
        for task in broker.list(args.queue).await?.into_iter().take(limit) {
            println!("{}", serde_json::to_string(&task)?);
        }
    }
    Ok(())
}
