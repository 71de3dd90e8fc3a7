// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `cimon`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cimon",
    version,
    about = "Poll CI sources for completed workflow runs and execute configured commands.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Cimon.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Cimon.toml")]
    pub config: String,

    /// Run exactly one poll cycle, then exit.
    #[arg(long)]
    pub once: bool,

    /// Parse + validate, print sources/actions/execution map, but don't
    /// poll or execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Delete the checkpoint state file before starting.
    ///
    /// All runs the source client still reports as recent will be
    /// re-processed, so their actions run again.
    #[arg(long)]
    pub reset_state: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CIMON_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
