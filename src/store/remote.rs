// src/store/remote.rs

//! Remote key-value engine.
//!
//! Each job key maps to one list (`snapwatch:<blake3(key)>`), newest entry
//! at the head. Entries are JSON with base64, zlib-compressed content.
//!
//! Appends never trim: history grows until `gc`/`compact` runs. Lists carry
//! no global time index, so `rollback_to` is refused.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{Result, SnapwatchError};
use crate::store::codec::{compress, decompress};
use crate::store::locks::KeyLocks;
use crate::store::{
    Capabilities, MaintenanceReport, NewSnapshot, Snapshot, SnapshotStore, Validators, key_digest,
};

const LIST_PREFIX: &str = "snapwatch:";

/// Minimal list operations the engine needs from a key-value server.
pub trait KvClient: Send + Sync {
    fn push_front(&self, list: &str, value: Vec<u8>) -> Result<()>;
    /// Inclusive range, negative indices count from the tail (Redis style).
    fn range(&self, list: &str, start: isize, stop: isize) -> Result<Vec<Vec<u8>>>;
    /// Keep only `start..=stop`.
    fn trim(&self, list: &str, start: isize, stop: isize) -> Result<()>;
    fn pop_front(&self, list: &str) -> Result<Option<Vec<u8>>>;
    fn len(&self, list: &str) -> Result<usize>;
    fn delete(&self, list: &str) -> Result<()>;
    fn lists(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Redis-backed client (synchronous connection).
pub struct RedisKv {
    conn: Mutex<redis::Connection>,
}

impl RedisKv {
    pub fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection()?;
        info!(url = %url, "connected to redis");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T> {
        let mut conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        Ok(cmd.query(&mut *conn)?)
    }
}

impl KvClient for RedisKv {
    fn push_front(&self, list: &str, value: Vec<u8>) -> Result<()> {
        self.query::<()>(redis::cmd("LPUSH").arg(list).arg(value))
    }

    fn range(&self, list: &str, start: isize, stop: isize) -> Result<Vec<Vec<u8>>> {
        self.query(redis::cmd("LRANGE").arg(list).arg(start).arg(stop))
    }

    fn trim(&self, list: &str, start: isize, stop: isize) -> Result<()> {
        self.query::<()>(redis::cmd("LTRIM").arg(list).arg(start).arg(stop))
    }

    fn pop_front(&self, list: &str) -> Result<Option<Vec<u8>>> {
        self.query(redis::cmd("LPOP").arg(list))
    }

    fn len(&self, list: &str) -> Result<usize> {
        self.query(redis::cmd("LLEN").arg(list))
    }

    fn delete(&self, list: &str) -> Result<()> {
        self.query::<()>(redis::cmd("DEL").arg(list))
    }

    fn lists(&self, prefix: &str) -> Result<Vec<String>> {
        self.query(redis::cmd("KEYS").arg(format!("{prefix}*")))
    }
}

/// In-process stand-in for a key-value server, with Redis list semantics.
#[derive(Debug, Default)]
pub struct MemoryKv {
    lists: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut HashMap<String, VecDeque<Vec<u8>>>) -> T) -> T {
        let mut lists = self.lists.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut lists)
    }
}

/// Resolve Redis-style inclusive indices against a list of `len` items.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    (start <= stop && start < len).then_some((start as usize, stop as usize))
}

impl KvClient for MemoryKv {
    fn push_front(&self, list: &str, value: Vec<u8>) -> Result<()> {
        self.with(|lists| lists.entry(list.to_string()).or_default().push_front(value));
        Ok(())
    }

    fn range(&self, list: &str, start: isize, stop: isize) -> Result<Vec<Vec<u8>>> {
        Ok(self.with(|lists| {
            let Some(items) = lists.get(list) else {
                return Vec::new();
            };
            match resolve_range(items.len(), start, stop) {
                Some((a, b)) => items.range(a..=b).cloned().collect(),
                None => Vec::new(),
            }
        }))
    }

    fn trim(&self, list: &str, start: isize, stop: isize) -> Result<()> {
        self.with(|lists| {
            let Some(items) = lists.get_mut(list) else {
                return;
            };
            match resolve_range(items.len(), start, stop) {
                Some((a, b)) => {
                    items.truncate(b + 1);
                    items.drain(..a);
                }
                None => items.clear(),
            }
            if items.is_empty() {
                lists.remove(list);
            }
        });
        Ok(())
    }

    fn pop_front(&self, list: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.with(|lists| {
            let items = lists.get_mut(list)?;
            let head = items.pop_front();
            if items.is_empty() {
                lists.remove(list);
            }
            head
        }))
    }

    fn len(&self, list: &str) -> Result<usize> {
        Ok(self.with(|lists| lists.get(list).map(VecDeque::len).unwrap_or(0)))
    }

    fn delete(&self, list: &str) -> Result<()> {
        self.with(|lists| lists.remove(list));
        Ok(())
    }

    fn lists(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self.with(|lists| {
            lists
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect()
        }))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    key: String,
    sequence: u64,
    captured_at_ms: i64,
    content: String,
    etag: Option<String>,
    last_modified: Option<String>,
    content_type: Option<String>,
}

impl Entry {
    fn encode(key: &str, sequence: u64, snapshot: &NewSnapshot) -> Result<Vec<u8>> {
        let entry = Entry {
            key: key.to_string(),
            sequence,
            captured_at_ms: snapshot.captured_at.timestamp_millis(),
            content: BASE64.encode(compress(&snapshot.content)?),
            etag: snapshot.validators.etag.clone(),
            last_modified: snapshot.validators.last_modified.clone(),
            content_type: snapshot.content_type.clone(),
        };
        Ok(serde_json::to_vec(&entry)?)
    }

    fn decode(raw: &[u8]) -> Result<Snapshot> {
        let entry: Entry = serde_json::from_slice(raw)?;
        let packed = BASE64
            .decode(entry.content.as_bytes())
            .map_err(|e| SnapwatchError::store_io("decoding remote entry", e))?;
        let captured_at = DateTime::from_timestamp_millis(entry.captured_at_ms).ok_or_else(|| {
            SnapwatchError::StoreIo(format!("invalid timestamp in remote entry for '{}'", entry.key))
        })?;
        Ok(Snapshot {
            job_key: entry.key,
            sequence: entry.sequence,
            captured_at,
            content: decompress(&packed)?,
            validators: Validators {
                etag: entry.etag,
                last_modified: entry.last_modified,
            },
            content_type: entry.content_type,
        })
    }
}

pub struct RemoteStore<C: KvClient> {
    client: C,
    locks: KeyLocks,
}

impl<C: KvClient> RemoteStore<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            locks: KeyLocks::new(),
        }
    }

    fn list_for(key: &str) -> String {
        format!("{LIST_PREFIX}{}", key_digest(key))
    }

    /// Job key stored in the head entry of `list`.
    fn key_of(&self, list: &str) -> Result<Option<String>> {
        let head = self.client.range(list, 0, 0)?;
        head.first()
            .map(|raw| Entry::decode(raw).map(|s| s.job_key))
            .transpose()
    }

    fn trim_list(&self, list: &str, retain: usize) -> Result<usize> {
        if retain == 0 {
            return Ok(0);
        }
        let before = self.client.len(list)?;
        if before <= retain {
            return Ok(0);
        }
        self.client.trim(list, 0, retain as isize - 1)?;
        Ok(before - retain)
    }
}

impl<C: KvClient> SnapshotStore for RemoteStore<C> {
    fn backend(&self) -> &'static str {
        "redis"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            history: true,
            bounded_retention: false,
            rollback: false,
            validators: true,
            writable: true,
        }
    }

    fn load_history(&self, key: &str, limit: usize) -> Result<Vec<Snapshot>> {
        let stop = if limit == 0 { -1 } else { limit as isize - 1 };
        self.client
            .range(&Self::list_for(key), 0, stop)?
            .iter()
            .map(|raw| Entry::decode(raw))
            .collect()
    }

    /// Unbounded: `max_snapshots` is not applied here.
    fn append(&self, key: &str, snapshot: NewSnapshot, _max_snapshots: usize) -> Result<Snapshot> {
        let list = Self::list_for(key);
        self.locks.with_key(key, || {
            let sequence = self
                .client
                .range(&list, 0, 0)?
                .first()
                .map(|raw| Entry::decode(raw).map(|s| s.sequence + 1))
                .transpose()?
                .unwrap_or(1);
            self.client
                .push_front(&list, Entry::encode(key, sequence, &snapshot)?)?;
            debug!(job = %key, sequence, "remote append");
            Ok(snapshot.into_snapshot(key, sequence))
        })
    }

    fn delete_latest(&self, key: &str) -> Result<bool> {
        let list = Self::list_for(key);
        self.locks
            .with_key(key, || Ok(self.client.pop_front(&list)?.is_some()))
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for list in self.client.lists(LIST_PREFIX)? {
            if let Some(key) = self.key_of(&list)? {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn gc(&self, active: &HashSet<String>, retain: usize) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();
        for list in self.client.lists(LIST_PREFIX)? {
            match self.key_of(&list)? {
                Some(key) if active.contains(&key) => {
                    report.removed_snapshots += self.trim_list(&list, retain)?;
                }
                _ => {
                    report.removed_snapshots += self.client.len(&list)?;
                    report.removed_keys += 1;
                    self.client.delete(&list)?;
                }
            }
        }
        Ok(report)
    }

    fn compact(&self, retain: usize) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();
        for list in self.client.lists(LIST_PREFIX)? {
            report.removed_snapshots += self.trim_list(&list, retain)?;
        }
        Ok(report)
    }

    fn rollback_to(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
        Err(SnapwatchError::unsupported(self.backend(), "rollback"))
    }
}
