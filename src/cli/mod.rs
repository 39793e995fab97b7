//! CLI module for Leanserve
//!
//! This module provides the command-line interface, including argument
//! parsing, configuration layering and subcommand handling.

pub mod commands;
pub mod output;

use clap::{Args, Parser, Subcommand};
use leanserve::config::CliOverrides;
use std::path::PathBuf;

/// Leanserve - memory-conscious serving core
///
/// Runs a pool of recycling worker processes whose heavy subsystems are
/// only built when a request first needs them.
#[derive(Parser, Debug, Clone)]
#[command(name = "leanserve")]
#[command(author = "Leanserve Contributors")]
#[command(version)]
#[command(about = "Memory-conscious serving core with a recycling worker pool", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "LEANSERVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the worker pool (or a single worker)
    Serve(commands::serve::ServeArgs),

    /// Show the resolved configuration, worker count and mount plan
    Plan(commands::plan::PlanArgs),
}

/// Server overrides shared by `serve` and `plan`.
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Bind host
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Number of worker processes (overrides CPU-based sizing)
    #[arg(short = 'w', long, allow_negative_numbers = true)]
    pub workers: Option<i64>,

    /// Runtime threads per worker
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Serve from this process instead of a worker pool
    #[arg(long)]
    pub single_process: bool,
}

impl OverrideArgs {
    pub fn to_overrides(&self) -> CliOverrides {
        CliOverrides {
            host: self.host.clone(),
            port: self.port,
            workers: self.workers,
            threads: self.threads,
            single_process: self.single_process,
        }
    }
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Overrides carried by the selected subcommand
    pub fn overrides(&self) -> CliOverrides {
        match &self.command {
            Commands::Serve(args) => args.overrides.to_overrides(),
            Commands::Plan(args) => args.overrides.to_overrides(),
        }
    }
}
