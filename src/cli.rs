// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `proclaunch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "proclaunch",
    version,
    about = "Launch a parallel job across nodes and track every rank to completion.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the launch file (TOML).
    ///
    /// Default: `Launch.toml` in the current working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCLAUNCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the placement plan, but don't spawn anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[config].fanout_limit`.
    #[arg(long, value_name = "N")]
    pub fanout: Option<usize>,
}

impl CliArgs {
    /// `--config` if given, else [`default_config_path`].
    pub fn config_path(&self) -> PathBuf {
        self.config
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path)
    }
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
