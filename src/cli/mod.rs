//! Command-line interface for taskbroker.
//!
//! Provides commands for enqueueing and inspecting tasks, recovering
//! unfinished work and running the scheduler sweep.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
