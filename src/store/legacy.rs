// src/store/legacy.rs

//! Legacy flat-file layout, kept only so old caches can be migrated.
//!
//! Every snapshot is its own file `<blake3(key)>-<captured_at_ms>.snap` in a
//! single directory, first line the JSON-quoted key, then the raw content.
//! There is no index: every read scans the directory. The engine never
//! writes.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::errors::{Result, SnapwatchError};
use crate::store::{
    Capabilities, MaintenanceReport, NewSnapshot, Snapshot, SnapshotStore, Validators,
};

#[derive(Debug, Clone)]
pub struct LegacyStore {
    dir: PathBuf,
}

impl LegacyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Every snapshot in the directory, grouped by key, oldest first.
    fn scan(&self) -> Result<BTreeMap<String, Vec<(DateTime<Utc>, Vec<u8>)>>> {
        let mut by_key: BTreeMap<String, Vec<(DateTime<Utc>, Vec<u8>)>> = BTreeMap::new();
        if !self.dir.exists() {
            return Ok(by_key);
        }

        let entries = fs::read_dir(&self.dir)
            .map_err(|e| SnapwatchError::store_io("listing legacy cache", e))?;
        for entry in entries {
            let path = entry
                .map_err(|e| SnapwatchError::store_io("listing legacy cache", e))?
                .path();
            let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".snap"))
            else {
                continue;
            };
            let Some(millis) = stem.rsplit_once('-').and_then(|(_, ts)| ts.parse::<i64>().ok())
            else {
                warn!(path = ?path, "skipping legacy file without timestamp");
                continue;
            };
            let Some(captured_at) = DateTime::from_timestamp_millis(millis) else {
                continue;
            };

            let raw = fs::read(&path).map_err(|e| SnapwatchError::store_io("reading legacy file", e))?;
            let newline = raw.iter().position(|b| *b == b'\n').ok_or_else(|| {
                SnapwatchError::StoreIo(format!("legacy file {:?} has no key header", path))
            })?;
            let key: String = serde_json::from_slice(&raw[..newline])?;
            by_key
                .entry(key)
                .or_default()
                .push((captured_at, raw[newline + 1..].to_vec()));
        }

        for history in by_key.values_mut() {
            history.sort_by_key(|(at, _)| *at);
        }
        Ok(by_key)
    }

    fn read_only(&self) -> SnapwatchError {
        SnapwatchError::unsupported(self.backend(), "writes (legacy caches are read-only)")
    }
}

impl SnapshotStore for LegacyStore {
    fn backend(&self) -> &'static str {
        "legacy"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            history: true,
            bounded_retention: false,
            rollback: false,
            validators: false,
            writable: false,
        }
    }

    fn load_history(&self, key: &str, limit: usize) -> Result<Vec<Snapshot>> {
        let mut scanned = self.scan()?;
        let history = scanned.remove(key).unwrap_or_default();
        let take = if limit == 0 { history.len() } else { limit };
        Ok(history
            .into_iter()
            .enumerate()
            .rev()
            .take(take)
            .map(|(idx, (captured_at, content))| Snapshot {
                job_key: key.to_string(),
                sequence: idx as u64 + 1,
                captured_at,
                content,
                validators: Validators::default(),
                content_type: None,
            })
            .collect())
    }

    fn append(&self, _key: &str, _snapshot: NewSnapshot, _max: usize) -> Result<Snapshot> {
        Err(self.read_only())
    }

    fn delete_latest(&self, _key: &str) -> Result<bool> {
        Err(self.read_only())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.scan()?.into_keys().collect())
    }

    fn gc(&self, _active: &HashSet<String>, _retain: usize) -> Result<MaintenanceReport> {
        Err(self.read_only())
    }

    fn compact(&self, _retain: usize) -> Result<MaintenanceReport> {
        Err(self.read_only())
    }

    fn rollback_to(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
        Err(SnapwatchError::unsupported(self.backend(), "rollback"))
    }
}
