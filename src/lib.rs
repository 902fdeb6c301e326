// src/lib.rs

pub mod cli;
pub mod commands;
pub mod config;
pub mod diff;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fetch;
pub mod filter;
pub mod job;
pub mod logging;
pub mod maintenance;
pub mod report;
pub mod store;
pub mod types;

use anyhow::Result;
use tracing::debug;

use crate::cli::{CliArgs, Command};
use crate::commands::{Context, inspect, maintain};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the job file once, then dispatches to the selected
/// subcommand. The job set is immutable for the rest of the invocation.
pub async fn run(args: CliArgs) -> Result<()> {
    let ctx = Context::load(&args)?;
    debug!(
        jobs = ctx.config.jobs.len(),
        storage = ?ctx.config.storage.kind,
        root = %ctx.root.display(),
        "configuration loaded"
    );

    match &args.command {
        Command::Run { jobs } => commands::run::run(&ctx, jobs).await?,
        Command::Errors => commands::run::errors(&ctx).await?,
        Command::List => inspect::list(&ctx)?,
        Command::Test { job } => inspect::test(&ctx, job).await?,
        Command::History { job, limit } => inspect::history(&ctx, job, *limit)?,
        Command::DeleteSnapshot { job } => maintain::delete_snapshot(&ctx, job)?,
        Command::Gc { retain } => maintain::gc(&ctx, *retain)?,
        Command::Compact { retain } => maintain::compact(&ctx, *retain)?,
        Command::Rollback { timestamp } => maintain::rollback(&ctx, timestamp)?,
        Command::Migrate { from } => maintain::migrate(&ctx, from)?,
    }
    Ok(())
}
