// src/store/memory.rs

//! In-process engine with the full capability set. Nothing survives the
//! process; used by tests and as the reference behaviour for the others.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::Result;
use crate::store::codec::{compress, decompress};
use crate::store::{
    Capabilities, MaintenanceReport, NewSnapshot, Snapshot, SnapshotStore, split_retained,
};

/// Stored form: content is kept compressed, like the sqlite engine.
#[derive(Debug, Clone)]
struct Entry {
    sequence: u64,
    captured_at: DateTime<Utc>,
    packed: Vec<u8>,
    validators: crate::store::Validators,
    content_type: Option<String>,
}

impl Entry {
    fn unpack(&self, key: &str) -> Result<Snapshot> {
        Ok(Snapshot {
            job_key: key.to_string(),
            sequence: self.sequence,
            captured_at: self.captured_at,
            content: decompress(&self.packed)?,
            validators: self.validators.clone(),
            content_type: self.content_type.clone(),
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Per key, newest first.
    entries: RwLock<HashMap<String, Vec<Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<Entry>>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<Entry>>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }

    fn trim_all(map: &mut HashMap<String, Vec<Entry>>, retain: usize) -> usize {
        let mut removed = 0;
        for entries in map.values_mut() {
            let (kept, dropped) = split_retained(std::mem::take(entries), retain);
            removed += dropped.len();
            *entries = kept;
        }
        removed
    }
}

impl SnapshotStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            history: true,
            bounded_retention: true,
            rollback: true,
            validators: true,
            writable: true,
        }
    }

    fn load_history(&self, key: &str, limit: usize) -> Result<Vec<Snapshot>> {
        let map = self.read();
        let Some(entries) = map.get(key) else {
            return Ok(Vec::new());
        };
        let take = if limit == 0 { entries.len() } else { limit };
        entries.iter().take(take).map(|e| e.unpack(key)).collect()
    }

    fn append(&self, key: &str, snapshot: NewSnapshot, max_snapshots: usize) -> Result<Snapshot> {
        let packed = compress(&snapshot.content)?;
        let mut map = self.write();
        let entries = map.entry(key.to_string()).or_default();
        let sequence = entries.first().map(|e| e.sequence + 1).unwrap_or(1);

        entries.insert(
            0,
            Entry {
                sequence,
                captured_at: snapshot.captured_at,
                packed,
                validators: snapshot.validators.clone(),
                content_type: snapshot.content_type.clone(),
            },
        );

        let (kept, dropped) = split_retained(std::mem::take(entries), max_snapshots);
        *entries = kept;
        if !dropped.is_empty() {
            debug!(job = %key, dropped = dropped.len(), "retention trimmed snapshots");
        }

        Ok(snapshot.into_snapshot(key, sequence))
    }

    fn delete_latest(&self, key: &str) -> Result<bool> {
        let mut map = self.write();
        let Some(entries) = map.get_mut(key) else {
            return Ok(false);
        };
        let existed = !entries.is_empty();
        if existed {
            entries.remove(0);
        }
        if entries.is_empty() {
            map.remove(key);
        }
        Ok(existed)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn gc(&self, active: &HashSet<String>, retain: usize) -> Result<MaintenanceReport> {
        let mut map = self.write();
        let stale: Vec<String> = map.keys().filter(|k| !active.contains(*k)).cloned().collect();

        let mut report = MaintenanceReport::default();
        for key in stale {
            if let Some(entries) = map.remove(&key) {
                report.removed_keys += 1;
                report.removed_snapshots += entries.len();
            }
        }
        report.removed_snapshots += Self::trim_all(&mut map, retain);
        Ok(report)
    }

    fn compact(&self, retain: usize) -> Result<MaintenanceReport> {
        let mut map = self.write();
        Ok(MaintenanceReport {
            removed_keys: 0,
            removed_snapshots: Self::trim_all(&mut map, retain),
        })
    }

    fn rollback_to(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut map = self.write();
        let mut removed = 0;
        for entries in map.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.captured_at <= cutoff);
            removed += before - entries.len();
        }
        map.retain(|_, entries| !entries.is_empty());
        Ok(removed)
    }
}
