// src/store/files.rs

//! Single-file-per-key engine.
//!
//! Layout: `<dir>/<blake3(key)>.snap`, first line is the JSON-quoted key,
//! the rest is the raw content. Only the latest snapshot is kept; the
//! capture time is the file's mtime. Validators and content type are not
//! stored, so conditional retrieval can only send `If-Modified-Since`
//! derived from that mtime.

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::errors::{Result, SnapwatchError};
use crate::store::locks::KeyLocks;
use crate::store::{
    Capabilities, MaintenanceReport, NewSnapshot, Snapshot, SnapshotStore, Validators, key_digest,
};

const EXTENSION: &str = "snap";

#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    locks: KeyLocks,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: KeyLocks::new(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", key_digest(key)))
    }

    fn snapshot_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| SnapwatchError::store_io("listing snapshot directory", e))?;
        for entry in entries {
            let path = entry
                .map_err(|e| SnapwatchError::store_io("listing snapshot directory", e))?
                .path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_file(path: &Path) -> Result<Snapshot> {
        let raw = fs::read(path).map_err(|e| SnapwatchError::store_io("reading snapshot", e))?;
        let (key, content) = split_header(&raw).ok_or_else(|| {
            SnapwatchError::StoreIo(format!("snapshot file {:?} has no key header", path))
        })?;
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| SnapwatchError::store_io("reading snapshot mtime", e))?;

        Ok(Snapshot {
            job_key: key,
            sequence: 1,
            captured_at: DateTime::<Utc>::from(modified),
            content: content.to_vec(),
            validators: Validators::default(),
            content_type: None,
        })
    }
}

fn split_header(raw: &[u8]) -> Option<(String, &[u8])> {
    let newline = raw.iter().position(|b| *b == b'\n')?;
    let key: String = serde_json::from_slice(&raw[..newline]).ok()?;
    Some((key, &raw[newline + 1..]))
}

/// Write `bytes` to a temp file next to `target`, stamp its mtime, then
/// rename over the target.
fn atomic_write(target: &Path, bytes: &[u8], mtime: SystemTime) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SnapwatchError::store_io("creating snapshot directory", e))?;
    }
    let temp = target.with_extension("tmp");
    fs::write(&temp, bytes).map_err(|e| SnapwatchError::store_io("writing snapshot", e))?;
    File::options()
        .write(true)
        .open(&temp)
        .and_then(|f| f.set_modified(mtime))
        .map_err(|e| SnapwatchError::store_io("stamping snapshot mtime", e))?;
    fs::rename(&temp, target).map_err(|e| SnapwatchError::store_io("renaming snapshot", e))?;
    Ok(())
}

impl SnapshotStore for FileStore {
    fn backend(&self) -> &'static str {
        "files"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            history: false,
            bounded_retention: false,
            rollback: false,
            validators: false,
            writable: true,
        }
    }

    fn load_history(&self, key: &str, _limit: usize) -> Result<Vec<Snapshot>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(vec![Self::read_file(&path)?])
    }

    /// Always replaces the previous snapshot; `max_snapshots` is ignored.
    fn append(&self, key: &str, snapshot: NewSnapshot, _max_snapshots: usize) -> Result<Snapshot> {
        let header = serde_json::to_string(key)?;
        let mut bytes = Vec::with_capacity(header.len() + 1 + snapshot.content.len());
        bytes.extend_from_slice(header.as_bytes());
        bytes.push(b'\n');
        bytes.extend_from_slice(&snapshot.content);

        let path = self.path_for(key);
        self.locks
            .with_key(key, || atomic_write(&path, &bytes, snapshot.captured_at.into()))?;
        debug!(job = %key, path = ?path, "wrote snapshot file");

        Ok(Snapshot {
            job_key: key.to_string(),
            sequence: 1,
            captured_at: snapshot.captured_at,
            content: snapshot.content,
            validators: Validators::default(),
            content_type: None,
        })
    }

    fn delete_latest(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        self.locks.with_key(key, || match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SnapwatchError::store_io("deleting snapshot", e)),
        })
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for path in self.snapshot_files()? {
            keys.push(Self::read_file(&path)?.job_key);
        }
        keys.sort();
        Ok(keys)
    }

    /// `retain` has no effect: at most one snapshot exists per key.
    fn gc(&self, active: &HashSet<String>, _retain: usize) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();
        for path in self.snapshot_files()? {
            let snapshot = Self::read_file(&path)?;
            if !active.contains(&snapshot.job_key) {
                fs::remove_file(&path)
                    .map_err(|e| SnapwatchError::store_io("removing stale snapshot", e))?;
                report.removed_keys += 1;
                report.removed_snapshots += 1;
            }
        }
        info!(removed = report.removed_keys, "files store gc finished");
        Ok(report)
    }

    fn compact(&self, _retain: usize) -> Result<MaintenanceReport> {
        Ok(MaintenanceReport::default())
    }

    fn rollback_to(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
        Err(SnapwatchError::unsupported(self.backend(), "rollback"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_latest_and_drops_validators() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let mut first = NewSnapshot::now(b"one".to_vec());
        first.validators.etag = Some("\"v1\"".into());
        store.append("https://example.org/", first, 4).unwrap();
        store
            .append("https://example.org/", NewSnapshot::now(b"two".to_vec()), 4)
            .unwrap();

        let history = store.load_history("https://example.org/", 0).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, b"two".to_vec());
        assert!(history[0].validators.is_empty());
        assert_eq!(store.keys().unwrap(), vec!["https://example.org/".to_string()]);
    }

    #[test]
    fn rollback_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.append("k", NewSnapshot::now(b"x".to_vec()), 0).unwrap();

        let err = store.rollback_to(Utc::now()).unwrap_err();
        assert!(matches!(err, SnapwatchError::StoreCapability { .. }));
        assert!(store.load("k").unwrap().is_some());
    }

    #[test]
    fn gc_removes_inactive_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.append("keep", NewSnapshot::now(b"1".to_vec()), 0).unwrap();
        store.append("drop", NewSnapshot::now(b"2".to_vec()), 0).unwrap();

        let active: HashSet<String> = ["keep".to_string()].into_iter().collect();
        let report = store.gc(&active, 1).unwrap();
        assert_eq!(report.removed_keys, 1);
        assert_eq!(store.keys().unwrap(), vec!["keep".to_string()]);
    }
}
