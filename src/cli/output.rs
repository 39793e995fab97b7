//! Output formatting module for Leanserve
//!
//! Human-readable, optionally colored output for the CLI commands.

use colored::Colorize;

/// Output formatter for terminal output
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();
        Self { use_color }
    }

    /// Print a banner/header
    pub fn banner(&self, title: &str) {
        let line = "=".repeat(title.len() + 4);
        if self.use_color {
            println!("{}", line.bright_blue());
            println!("{}", format!("  {}  ", title).bright_blue().bold());
            println!("{}", line.bright_blue());
        } else {
            println!("{}", line);
            println!("  {}  ", title);
            println!("{}", line);
        }
    }

    /// Print a section heading
    pub fn section(&self, title: &str) {
        if self.use_color {
            println!("\n{}", title.bold());
        } else {
            println!("\n{}", title);
        }
    }

    /// Print an aligned key/value line
    pub fn key_value(&self, key: &str, value: impl std::fmt::Display) {
        if self.use_color {
            println!("  {:<42} {}", key.cyan(), value);
        } else {
            println!("  {:<42} {}", key, value);
        }
    }

    /// Print a route group decision
    pub fn group(&self, name: &str, mounted: bool, detail: &str) {
        let status = if mounted { "mounted" } else { "skipped" };
        let status = match (self.use_color, mounted) {
            (true, true) => status.green().to_string(),
            (true, false) => status.yellow().to_string(),
            (false, _) => status.to_string(),
        };
        if detail.is_empty() {
            println!("  {:<12} {}", name, status);
        } else {
            println!("  {:<12} {} ({})", name, status, detail);
        }
    }
}
