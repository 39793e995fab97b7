//! Subcommands module for Leanserve CLI
//!
//! This module contains all the subcommand implementations.

pub mod plan;
pub mod serve;

use std::sync::Arc;

use leanserve::config::ConfigSnapshot;

use crate::cli::output::OutputFormatter;

/// Successful exit.
pub const EXIT_OK: i32 = 0;

/// Runtime failure.
pub const EXIT_FAILURE: i32 = 1;

/// Configuration or startup failure.
pub const EXIT_CONFIG: i32 = leanserve::pool::EXIT_STARTUP_FAILED;

/// Common context shared between commands
pub struct CommandContext {
    /// Resolved configuration
    pub snapshot: Arc<ConfigSnapshot>,
    /// Output formatter
    pub output: OutputFormatter,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, snapshot: Arc<ConfigSnapshot>) -> Self {
        Self {
            snapshot,
            output: OutputFormatter::new(!cli.no_color),
        }
    }
}
