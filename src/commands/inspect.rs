// src/commands/inspect.rs

//! Read-only commands: `list`, `test`, `history`.

use std::io::{self, Write};

use crate::diff::{DiffOptions, Differ, UnifiedDiffer};
use crate::errors::{Result, SnapwatchError};
use crate::exec::FetchStatus;
use crate::store::Snapshot;

use super::Context;

pub fn list(ctx: &Context) -> Result<()> {
    let mut out = io::stdout().lock();
    for job in &ctx.config.jobs {
        let mut line = format!("{:>3}. [{}] {}", job.index, job.kind, job.display_name());
        if job.name.is_some() {
            line.push_str(&format!(" ({})", job.key()));
        }
        if !job.enabled {
            line.push_str(" (disabled)");
        }
        writeln!(out, "{line}")?;
    }
    Ok(())
}

/// Fetch one job, print its filtered content and how it would be
/// classified. Nothing is stored.
pub async fn test(ctx: &Context, selector: &str) -> Result<()> {
    let job = ctx.job(selector)?.clone();
    let store = ctx.open_store()?;
    let engine = ctx.engine(store, false)?;

    let (outcome, selection) = engine.probe(&job).await?;
    if let FetchStatus::Failed(failure) = outcome.status {
        return Err(failure.into_error(job.key()));
    }

    let mut out = io::stdout().lock();
    out.write_all(&outcome.content)?;
    if !outcome.content.ends_with(b"\n") {
        writeln!(out)?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "--- {} ({} tries, {} ms): would be {}",
        job.display_name(),
        outcome.tries,
        outcome.elapsed.as_millis(),
        selection.record.classification
    )?;
    if let Some(payload) = &selection.record.payload {
        write!(out, "{}", payload.text)?;
    }
    Ok(())
}

/// Print stored snapshots of a job oldest to newest, each as a diff
/// against the one before it.
pub fn history(ctx: &Context, selector: &str, limit: usize) -> Result<()> {
    let job = ctx.job(selector)?;
    let store = ctx.open_store()?;
    let mut snapshots = store.load_history(job.key(), limit)?;
    snapshots.reverse();

    let mut out = io::stdout().lock();
    if snapshots.is_empty() {
        writeln!(out, "no snapshots stored for {}", job.display_name())?;
        return Ok(());
    }

    let differ = UnifiedDiffer;
    let mut previous: Option<&Snapshot> = None;
    for snapshot in &snapshots {
        writeln!(
            out,
            "=== #{} captured {}",
            snapshot.sequence,
            snapshot.captured_at.to_rfc3339()
        )?;
        match previous {
            None => {
                out.write_all(&snapshot.content)?;
                if !snapshot.content.ends_with(b"\n") {
                    writeln!(out)?;
                }
            }
            Some(prev) => {
                let options = DiffOptions {
                    context: ctx.config.config.diff_context,
                    old_label: format!("#{}", prev.sequence),
                    new_label: format!("#{}", snapshot.sequence),
                };
                let payload = differ
                    .compare(&prev.content, &snapshot.content, &options)
                    .map_err(|message| SnapwatchError::Content {
                        key: job.key().to_string(),
                        message,
                    })?;
                write!(out, "{}", payload.text)?;
            }
        }
        previous = Some(snapshot);
    }
    Ok(())
}
