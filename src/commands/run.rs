// src/commands/run.rs

//! `run` and `errors`.

use tracing::info;

use crate::engine::{ReportScope, RunTransaction, TransactionMode, run_session};
use crate::errors::{Result, SnapwatchError};
use crate::job::JobSpec;
use crate::report::ReporterSet;

use super::Context;

/// Jobs to run. With no selectors, every enabled job; explicitly selected
/// jobs run even when disabled.
pub fn select_jobs(ctx: &Context, selectors: &[String]) -> Result<Vec<JobSpec>> {
    if selectors.is_empty() {
        return Ok(ctx
            .config
            .jobs
            .iter()
            .filter(|j| j.enabled)
            .cloned()
            .collect());
    }

    let mut jobs: Vec<JobSpec> = Vec::with_capacity(selectors.len());
    for selector in selectors {
        let job = ctx.job(selector)?;
        if !jobs.iter().any(|j| j.index == job.index) {
            jobs.push(job.clone());
        }
    }
    Ok(jobs)
}

pub async fn run(ctx: &Context, selectors: &[String]) -> Result<()> {
    let jobs = select_jobs(ctx, selectors)?;
    let store = ctx.open_store()?;
    let engine = ctx.engine(store.clone(), false)?;
    let tx = RunTransaction::open(
        store,
        TransactionMode::ReadWrite,
        ctx.config.storage.max_snapshots,
    );
    let reporters = ReporterSet::from_config(&ctx.config.reporters);

    let report = run_session(&engine, jobs, tx, &reporters, ReportScope::All).await?;
    info!(
        jobs = report.records.len(),
        errors = report.error_count(),
        written = report.committed.written,
        "run finished"
    );
    Ok(())
}

/// Audit run: one worker, errors only, nothing written. Fails when any
/// job errored.
pub async fn errors(ctx: &Context) -> Result<()> {
    let jobs = select_jobs(ctx, &[])?;
    let store = ctx.open_store()?;
    let engine = ctx.engine(store.clone(), true)?;
    let tx = RunTransaction::open(
        store,
        TransactionMode::ReadOnly,
        ctx.config.storage.max_snapshots,
    );
    let reporters = ReporterSet::from_config(&ctx.config.reporters);

    let report = run_session(&engine, jobs, tx, &reporters, ReportScope::ErrorsOnly).await?;
    match report.error_count() {
        0 => Ok(()),
        n => Err(SnapwatchError::Other(anyhow::anyhow!("{n} job(s) reported errors"))),
    }
}
