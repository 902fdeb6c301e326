// src/store/mod.rs

//! Versioned snapshot storage.
//!
//! Every engine implements [`SnapshotStore`]. Engines differ in what they can
//! do, and say so through [`Capabilities`]:
//!
//! | engine   | history   | bounded append | rollback | validators | writable |
//! |----------|-----------|----------------|----------|------------|----------|
//! | sqlite   | yes       | yes            | yes      | yes        | yes      |
//! | memory   | yes       | yes            | yes      | yes        | yes      |
//! | files    | latest    | n/a (always 1) | no       | no         | yes      |
//! | redis    | unbounded | no             | no       | yes        | yes      |
//! | legacy   | unbounded | no             | no       | no         | no       |
//!
//! The redis engine ignores `max_snapshots` on append and grows until the
//! next `gc`/`compact`. Operations an engine lacks return
//! [`SnapwatchError::StoreCapability`] before touching any data.
//!
//! Engines serialise appends per key (see [`locks`]) but never hold a lock
//! across keys, so jobs reading different keys proceed concurrently. The
//! sqlite engine serves reads from a pool of read-only connections next to
//! its single writer; an in-memory sqlite database has only the writer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::StorageConfig;
use crate::errors::{Result, SnapwatchError};
use crate::job::JobKey;
use crate::types::StorageKind;

pub mod codec;
pub mod files;
pub mod legacy;
pub mod locks;
pub mod memory;
pub mod remote;
pub mod sqlite;

pub use files::FileStore;
pub use legacy::LegacyStore;
pub use memory::MemoryStore;
pub use remote::{KvClient, MemoryKv, RedisKv, RemoteStore};
pub use sqlite::SqliteStore;

/// Cache validators returned by a server alongside a full response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// A persisted, immutable captured state of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub job_key: JobKey,
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub content: Vec<u8>,
    pub validators: Validators,
    pub content_type: Option<String>,
}

/// A snapshot waiting to be written. The store assigns the sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnapshot {
    pub captured_at: DateTime<Utc>,
    pub content: Vec<u8>,
    pub validators: Validators,
    pub content_type: Option<String>,
}

impl NewSnapshot {
    pub fn now(content: Vec<u8>) -> Self {
        Self {
            captured_at: Utc::now(),
            content,
            validators: Validators::default(),
            content_type: None,
        }
    }

    fn into_snapshot(self, job_key: &str, sequence: u64) -> Snapshot {
        Snapshot {
            job_key: job_key.to_string(),
            sequence,
            captured_at: self.captured_at,
            content: self.content,
            validators: self.validators,
            content_type: self.content_type,
        }
    }
}

impl From<&Snapshot> for NewSnapshot {
    fn from(s: &Snapshot) -> Self {
        Self {
            captured_at: s.captured_at,
            content: s.content.clone(),
            validators: s.validators.clone(),
            content_type: s.content_type.clone(),
        }
    }
}

/// What an engine is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Keeps more than the latest snapshot per key.
    pub history: bool,
    /// Enforces `max_snapshots` atomically with `append`.
    pub bounded_retention: bool,
    /// Supports `rollback_to`.
    pub rollback: bool,
    /// Preserves validators and content type.
    pub validators: bool,
    /// Accepts writes at all.
    pub writable: bool,
}

/// Result of a `gc`/`compact` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub removed_keys: usize,
    pub removed_snapshots: usize,
}

/// Durable, keyed, versioned storage of content snapshots.
///
/// `limit`/`retain`/`max_snapshots` of 0 mean "unbounded" everywhere.
pub trait SnapshotStore: Send + Sync {
    /// Short engine name used in logs and capability errors.
    fn backend(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Latest snapshot for `key`, if any.
    fn load(&self, key: &str) -> Result<Option<Snapshot>> {
        Ok(self.load_history(key, 1)?.into_iter().next())
    }

    /// Snapshots for `key`, most recent first.
    fn load_history(&self, key: &str, limit: usize) -> Result<Vec<Snapshot>>;

    /// Append a snapshot and, where supported, drop the oldest ones beyond
    /// `max_snapshots` in the same operation.
    fn append(&self, key: &str, snapshot: NewSnapshot, max_snapshots: usize) -> Result<Snapshot>;

    /// Remove the most recent snapshot of `key`. Returns whether one existed.
    fn delete_latest(&self, key: &str) -> Result<bool>;

    fn keys(&self) -> Result<Vec<JobKey>>;

    /// Drop every key not in `active`, then keep only the newest `retain`
    /// snapshots of the remaining keys.
    fn gc(&self, active: &HashSet<String>, retain: usize) -> Result<MaintenanceReport>;

    /// Keep only the newest `retain` snapshots of every key.
    fn compact(&self, retain: usize) -> Result<MaintenanceReport>;

    /// Permanently delete every snapshot captured after `cutoff`. Returns the
    /// number of snapshots removed.
    fn rollback_to(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Copy the full history of every key in `source` into this store,
    /// oldest first, preserving timestamps.
    fn migrate_from(&self, source: &dyn SnapshotStore) -> Result<usize> {
        if !self.capabilities().writable {
            return Err(SnapwatchError::unsupported(self.backend(), "writes"));
        }

        let mut copied = 0;
        for key in source.keys()? {
            let mut history = source.load_history(&key, 0)?;
            history.reverse();
            for snapshot in history.iter() {
                self.append(&key, NewSnapshot::from(snapshot), 0)?;
                copied += 1;
            }
        }

        info!(
            from = source.backend(),
            to = self.backend(),
            copied,
            "migrated snapshots"
        );
        Ok(copied)
    }
}

/// Stable, filesystem-safe digest of a job key.
pub fn key_digest(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

/// On-disk location of a file-backed engine. Relative paths resolve against
/// `root` (the directory holding the config file).
pub fn storage_path(cfg: &StorageConfig, root: &Path) -> Option<PathBuf> {
    let default = match cfg.kind {
        StorageKind::Sqlite => "snapwatch.db",
        StorageKind::Files => "snapwatch-cache",
        StorageKind::Legacy => "snapwatch-legacy",
        StorageKind::Memory | StorageKind::Redis => return None,
    };
    let path = cfg.path.clone().unwrap_or_else(|| default.into());
    Some(if path.is_absolute() { path } else { root.join(path) })
}

/// Open the engine selected by `[storage]`.
pub fn open_store(cfg: &StorageConfig, root: &Path) -> Result<Arc<dyn SnapshotStore>> {
    let path = storage_path(cfg, root);

    let store: Arc<dyn SnapshotStore> = match (cfg.kind, path) {
        (StorageKind::Sqlite, Some(path)) => Arc::new(SqliteStore::open(path)?),
        (StorageKind::Files, Some(path)) => Arc::new(FileStore::new(path)),
        (StorageKind::Legacy, Some(path)) => Arc::new(LegacyStore::new(path)),
        (StorageKind::Redis, _) => {
            let url = cfg.url.as_deref().ok_or_else(|| {
                SnapwatchError::ConfigError("[storage].url is required for redis".to_string())
            })?;
            Arc::new(RemoteStore::new(RedisKv::connect(url)?))
        }
        _ => Arc::new(MemoryStore::new()),
    };

    info!(backend = store.backend(), "opened snapshot store");
    Ok(store)
}

/// Advisory maintenance lock next to a file-backed store.
pub fn lock_path(cfg: &StorageConfig, root: &Path) -> Option<PathBuf> {
    let path = storage_path(cfg, root)?;
    let mut name = path.file_name()?.to_os_string();
    name.push(".lock");
    Some(path.with_file_name(name))
}

/// Trim a newest-first history to `retain` entries, returning the dropped
/// tail. Shared by engines that keep history in memory-shaped structures.
pub(crate) fn split_retained<T>(mut newest_first: Vec<T>, retain: usize) -> (Vec<T>, Vec<T>) {
    if retain == 0 || newest_first.len() <= retain {
        return (newest_first, Vec::new());
    }
    let dropped = newest_first.split_off(retain);
    (newest_first, dropped)
}
