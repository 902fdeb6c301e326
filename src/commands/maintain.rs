// src/commands/maintain.rs

//! Maintenance commands. Each holds the advisory maintenance lock for its
//! whole duration.

use std::path::Path;

use crate::errors::Result;
use crate::maintenance::{self, MaintenanceLock};

use super::Context;

pub fn delete_snapshot(ctx: &Context, selector: &str) -> Result<()> {
    let job = ctx.job(selector)?;
    let _lock = MaintenanceLock::acquire(ctx.lock_path())?;
    let store = ctx.open_store()?;
    if maintenance::delete_latest(store.as_ref(), job)? {
        println!("deleted latest snapshot of {}", job.display_name());
    } else {
        println!("no snapshot stored for {}", job.display_name());
    }
    Ok(())
}

pub fn gc(ctx: &Context, retain: usize) -> Result<()> {
    let _lock = MaintenanceLock::acquire(ctx.lock_path())?;
    let store = ctx.open_store()?;
    let report = maintenance::gc(store.as_ref(), &ctx.config.jobs, retain)?;
    println!(
        "gc: removed {} key(s), {} snapshot(s)",
        report.removed_keys, report.removed_snapshots
    );
    Ok(())
}

pub fn compact(ctx: &Context, retain: usize) -> Result<()> {
    let _lock = MaintenanceLock::acquire(ctx.lock_path())?;
    let store = ctx.open_store()?;
    let report = maintenance::compact(store.as_ref(), retain)?;
    println!("compact: removed {} snapshot(s)", report.removed_snapshots);
    Ok(())
}

pub fn rollback(ctx: &Context, timestamp: &str) -> Result<()> {
    let cutoff = maintenance::parse_timestamp(timestamp)?;
    let _lock = MaintenanceLock::acquire(ctx.lock_path())?;
    let store = ctx.open_store()?;
    let removed = maintenance::rollback(store.as_ref(), cutoff)?;
    println!("rollback to {}: removed {removed} snapshot(s)", cutoff.to_rfc3339());
    Ok(())
}

pub fn migrate(ctx: &Context, from: &Path) -> Result<()> {
    let _lock = MaintenanceLock::acquire(ctx.lock_path())?;
    let store = ctx.open_store()?;
    let copied = maintenance::migrate(store.as_ref(), from)?;
    println!("migrated {copied} snapshot(s) from {}", from.display());
    Ok(())
}
