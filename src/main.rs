//! Leanserve - memory-conscious serving core
//!
//! This is the main entry point for the Leanserve CLI.

mod cli;

use std::sync::Arc;

use anyhow::Result;
use cli::commands::{CommandContext, EXIT_CONFIG, EXIT_FAILURE};
use cli::{Cli, Commands};
use colored::Colorize;
use leanserve::config::{Config, ConfigSnapshot, LogFormat};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// The runtime is built per command so worker thread counts can follow
// the resolved configuration.
fn main() {
    let cli = Cli::parse_args();

    let exit_code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            exit_code_for(&e)
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<i32> {
    let mut config = Config::load(cli.config.as_ref())?;
    config.apply_overrides(&cli.overrides());
    let snapshot = Arc::new(config.resolve()?);

    init_logging(&snapshot, cli.verbosity());

    let ctx = CommandContext::new(cli, snapshot);
    match &cli.command {
        Commands::Serve(args) => args.execute(&ctx),
        Commands::Plan(args) => args.execute(&ctx),
    }
}

/// Configuration and worker startup failures get the dedicated exit code.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<leanserve::Error>() {
        Some(e) if e.is_fatal_at_startup() => EXIT_CONFIG,
        _ => EXIT_FAILURE,
    }
}

/// Initialize logging from the configured level, raised by `-v` flags.
///
/// `RUST_LOG` takes precedence over both.
fn init_logging(snapshot: &ConfigSnapshot, verbosity: u8) {
    let level = match verbosity {
        0 => snapshot.log_level(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match snapshot.log_format() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity >= 3),
            )
            .with(env_filter)
            .init(),
    }
}
