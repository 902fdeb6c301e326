// src/maintenance.rs

//! Explicit, user-invoked store maintenance: gc, compact, rollback,
//! single-snapshot deletion and migration.
//!
//! These run outside any run transaction and assume no concurrent run
//! against the same store. The advisory lock file next to file-backed
//! stores only excludes other maintenance commands; `run` never takes it.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};

use crate::errors::{Result, SnapwatchError};
use crate::job::JobSpec;
use crate::store::{LegacyStore, MaintenanceReport, SnapshotStore};

/// Held for the duration of a maintenance command; removes its lock file
/// on drop.
#[derive(Debug)]
pub struct MaintenanceLock {
    path: Option<PathBuf>,
}

impl MaintenanceLock {
    /// Take the lock at `path`. `None` (engines without a local path) is a
    /// no-op lock.
    pub fn acquire(path: Option<PathBuf>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self { path: None });
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Dropped on a failed write so the lock file goes with it.
                let lock = Self { path: Some(path) };
                writeln!(file, "{}", std::process::id())
                    .map_err(|e| SnapwatchError::store_io("writing maintenance lock", e))?;
                Ok(lock)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(SnapwatchError::StoreIo(
                format!(
                    "another maintenance operation holds {} (remove it if stale)",
                    path.display()
                ),
            )),
            Err(e) => Err(SnapwatchError::store_io("creating maintenance lock", e)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for MaintenanceLock {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove maintenance lock");
            }
        }
    }
}

/// Parse a rollback cutoff: unix seconds or RFC 3339.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| SnapwatchError::ConfigError(format!("timestamp out of range: {raw}")));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            SnapwatchError::ConfigError(format!(
                "invalid timestamp '{raw}' (expected unix seconds or RFC 3339): {e}"
            ))
        })
}

/// Drop keys no job refers to any more, then trim the rest to `retain`.
pub fn gc(store: &dyn SnapshotStore, jobs: &[JobSpec], retain: usize) -> Result<MaintenanceReport> {
    let active: HashSet<String> = jobs.iter().map(|j| j.key().to_string()).collect();
    let report = store.gc(&active, retain)?;
    info!(
        backend = store.backend(),
        retain,
        removed_keys = report.removed_keys,
        removed_snapshots = report.removed_snapshots,
        "gc finished"
    );
    Ok(report)
}

pub fn compact(store: &dyn SnapshotStore, retain: usize) -> Result<MaintenanceReport> {
    let report = store.compact(retain)?;
    info!(
        backend = store.backend(),
        retain,
        removed_snapshots = report.removed_snapshots,
        "compact finished"
    );
    Ok(report)
}

/// Irreversibly delete everything captured after `cutoff`.
pub fn rollback(store: &dyn SnapshotStore, cutoff: DateTime<Utc>) -> Result<usize> {
    if !store.capabilities().rollback {
        return Err(SnapwatchError::unsupported(store.backend(), "rollback"));
    }
    let removed = store.rollback_to(cutoff)?;
    info!(backend = store.backend(), %cutoff, removed, "rollback finished");
    Ok(removed)
}

/// Remove the latest snapshot of `job`, so the next run diffs against the
/// one before it.
pub fn delete_latest(store: &dyn SnapshotStore, job: &JobSpec) -> Result<bool> {
    let removed = store.delete_latest(job.key())?;
    info!(backend = store.backend(), job = %job.display_name(), removed, "delete-snapshot finished");
    Ok(removed)
}

/// Copy the legacy flat-file store at `from` into `target`.
pub fn migrate(target: &dyn SnapshotStore, from: &Path) -> Result<usize> {
    if !from.is_dir() {
        return Err(SnapwatchError::ConfigError(format!(
            "legacy store directory not found: {}",
            from.display()
        )));
    }
    let source = LegacyStore::new(from.to_path_buf());
    target.migrate_from(&source)
}
