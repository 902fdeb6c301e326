// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::StorageKind;

/// Command-line arguments for `snapwatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "snapwatch",
    version,
    about = "Re-fetch web pages and command output, report what changed.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$SNAPWATCH_CONFIG`, else `Snapwatch.toml` in the current
    /// working directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SNAPWATCH_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Cap on parallel workers for both scheduling phases.
    #[arg(long, global = true, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Override `[storage].kind`.
    #[arg(long, global = true, value_name = "KIND", value_parser = StorageKind::from_str)]
    pub storage: Option<StorageKind>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run all enabled jobs, or only the given ones (index, key or name).
    Run {
        #[arg(value_name = "JOB")]
        jobs: Vec<String>,
    },

    /// Audit run: one worker, report only errors, write nothing.
    Errors,

    /// List jobs with their index.
    List,

    /// Run one job and print its filtered content; nothing is stored.
    Test {
        #[arg(value_name = "JOB")]
        job: String,
    },

    /// Show stored history of a job as successive diffs.
    History {
        #[arg(value_name = "JOB")]
        job: String,

        /// Number of snapshots to show (0 = all).
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Delete the most recent snapshot of a job.
    DeleteSnapshot {
        #[arg(value_name = "JOB")]
        job: String,
    },

    /// Remove snapshots of jobs no longer configured; keep RETAIN per job.
    Gc {
        #[arg(value_name = "RETAIN", default_value_t = 1)]
        retain: usize,
    },

    /// Keep only RETAIN snapshots per key, for every key.
    Compact {
        #[arg(value_name = "RETAIN", default_value_t = 1)]
        retain: usize,
    },

    /// Permanently delete every snapshot captured after TIMESTAMP
    /// (unix seconds or RFC 3339).
    Rollback {
        #[arg(value_name = "TIMESTAMP")]
        timestamp: String,
    },

    /// Import a legacy flat-file store into the configured store.
    Migrate {
        #[arg(long, value_name = "DIR")]
        from: PathBuf,
    },
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
