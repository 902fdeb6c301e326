// src/store/sqlite.rs

//! Default engine: one SQLite database, zlib-compressed content, indexed by
//! `(job_key, sequence)` for history and by `captured_at` for rollback.
//!
//! Appends run inside a transaction together with retention enforcement, so
//! an interrupted append leaves either the old or the new history, never a
//! history longer than `max_snapshots`.
//!
//! On-disk databases run in WAL mode with one writer connection plus a pool
//! of read-only connections, so history lookups never queue behind appends
//! or behind each other. In-memory databases cannot be shared between
//! connections and route reads through the writer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info};

use crate::errors::{Result, SnapwatchError};
use crate::store::codec::{compress, decompress};
use crate::store::{Capabilities, MaintenanceReport, NewSnapshot, Snapshot, SnapshotStore, Validators};

/// Ordered schema migrations. Append only; never edit an applied entry.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_snapshots",
    "CREATE TABLE snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_key TEXT NOT NULL,
        sequence INTEGER NOT NULL,
        captured_at INTEGER NOT NULL,
        content BLOB NOT NULL,
        etag TEXT,
        last_modified TEXT,
        content_type TEXT,
        UNIQUE (job_key, sequence)
    );
    CREATE INDEX idx_snapshots_key_seq ON snapshots (job_key, sequence DESC);
    CREATE INDEX idx_snapshots_captured_at ON snapshots (captured_at);",
)];

const SELECT_COLUMNS: &str =
    "job_key, sequence, captured_at, content, etag, last_modified, content_type";

/// Row as read from SQLite, before decompression.
struct RawRow {
    job_key: String,
    sequence: i64,
    captured_at: i64,
    content: Vec<u8>,
    etag: Option<String>,
    last_modified: Option<String>,
    content_type: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            job_key: row.get(0)?,
            sequence: row.get(1)?,
            captured_at: row.get(2)?,
            content: row.get(3)?,
            etag: row.get(4)?,
            last_modified: row.get(5)?,
            content_type: row.get(6)?,
        })
    }

    fn into_snapshot(self) -> Result<Snapshot> {
        let captured_at = DateTime::from_timestamp_millis(self.captured_at).ok_or_else(|| {
            SnapwatchError::StoreIo(format!(
                "invalid captured_at {} for '{}'",
                self.captured_at, self.job_key
            ))
        })?;
        Ok(Snapshot {
            sequence: self.sequence as u64,
            captured_at,
            content: decompress(&self.content)?,
            validators: Validators {
                etag: self.etag,
                last_modified: self.last_modified,
            },
            content_type: self.content_type,
            job_key: self.job_key,
        })
    }
}

/// Idle connections kept for reuse.
const MAX_IDLE_READERS: usize = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-only connections to an on-disk database. The pool mutex is held
/// only to check a connection out or back in, never across a query.
struct ReaderPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl ReaderPool {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            idle: Mutex::new(Vec::new()),
        }
    }

    fn checkout(&self) -> Result<Connection> {
        let idle = self.idle.lock().unwrap_or_else(|p| p.into_inner()).pop();
        if let Some(conn) = idle {
            return Ok(conn);
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        debug!(path = ?self.path, "opened sqlite reader");
        Ok(conn)
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(|p| p.into_inner());
        if idle.len() < MAX_IDLE_READERS {
            idle.push(conn);
        }
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    readers: Option<ReaderPool>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply pending
    /// migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SnapwatchError::store_io("creating database directory", e))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::from_connection(conn, Some(ReaderPool::new(path)))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(mut conn: Connection, readers: Option<ReaderPool>) -> Result<Self> {
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            readers,
        })
    }

    /// The writer connection.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run a read-only query on a pooled reader, or on the writer for
    /// in-memory databases.
    fn read<T>(&self, query: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        match &self.readers {
            Some(pool) => {
                let conn = pool.checkout()?;
                let out = query(&conn);
                if out.is_ok() {
                    pool.checkin(conn);
                }
                out
            }
            None => query(&self.conn()),
        }
    }

    /// Delete everything but the newest `retain` rows of `key`.
    fn trim_key(conn: &Connection, key: &str, retain: usize) -> Result<usize> {
        if retain == 0 {
            return Ok(0);
        }
        let removed = conn.execute(
            "DELETE FROM snapshots
             WHERE job_key = ?1
               AND sequence NOT IN (
                   SELECT sequence FROM snapshots
                   WHERE job_key = ?1
                   ORDER BY sequence DESC
                   LIMIT ?2
               )",
            params![key, retain as i64],
        )?;
        Ok(removed)
    }

    fn distinct_keys(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT DISTINCT job_key FROM snapshots ORDER BY job_key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    /// Give freed pages back to the filesystem.
    fn reclaim(conn: &Connection) -> Result<()> {
        conn.execute_batch("VACUUM")?;
        debug!("sqlite store vacuumed");
        Ok(())
    }
}

fn apply_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            migration_id TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    for (id, sql) in MIGRATIONS {
        let applied: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM schema_version WHERE migration_id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        if applied.is_some() {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .map_err(|e| SnapwatchError::StoreIo(format!("migration {id} failed: {e}")))?;
        tx.execute(
            "INSERT INTO schema_version (migration_id, applied_at) VALUES (?1, ?2)",
            params![id, Utc::now().timestamp()],
        )?;
        tx.commit()?;
        info!(migration = %id, "applied sqlite migration");
    }
    Ok(())
}

impl SnapshotStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
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
        let limit: i64 = if limit == 0 { -1 } else { limit as i64 };
        let rows = self.read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM snapshots
                 WHERE job_key = ?1 ORDER BY sequence DESC LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![key, limit], RawRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(RawRow::into_snapshot).collect()
    }

    fn append(&self, key: &str, snapshot: NewSnapshot, max_snapshots: usize) -> Result<Snapshot> {
        let packed = compress(&snapshot.content)?;
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let sequence: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM snapshots WHERE job_key = ?1",
            [key],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO snapshots
                (job_key, sequence, captured_at, content, etag, last_modified, content_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key,
                sequence,
                snapshot.captured_at.timestamp_millis(),
                packed,
                snapshot.validators.etag,
                snapshot.validators.last_modified,
                snapshot.content_type,
            ],
        )?;
        let dropped = Self::trim_key(&tx, key, max_snapshots)?;
        tx.commit()?;

        debug!(job = %key, sequence, dropped, "sqlite append committed");
        Ok(snapshot.into_snapshot(key, sequence as u64))
    }

    fn delete_latest(&self, key: &str) -> Result<bool> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM snapshots WHERE job_key = ?1 AND sequence = (
                SELECT MAX(sequence) FROM snapshots WHERE job_key = ?1
            )",
            [key],
        )?;
        Ok(removed > 0)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.read(Self::distinct_keys)
    }

    fn gc(&self, active: &HashSet<String>, retain: usize) -> Result<MaintenanceReport> {
        let mut conn = self.conn();
        let mut report = MaintenanceReport::default();
        {
            let tx = conn.transaction()?;
            for key in Self::distinct_keys(&tx)? {
                if active.contains(&key) {
                    report.removed_snapshots += Self::trim_key(&tx, &key, retain)?;
                } else {
                    report.removed_keys += 1;
                    report.removed_snapshots +=
                        tx.execute("DELETE FROM snapshots WHERE job_key = ?1", [&key])?;
                }
            }
            tx.commit()?;
        }
        Self::reclaim(&conn)?;
        Ok(report)
    }

    fn compact(&self, retain: usize) -> Result<MaintenanceReport> {
        let mut conn = self.conn();
        let mut report = MaintenanceReport::default();
        {
            let tx = conn.transaction()?;
            for key in Self::distinct_keys(&tx)? {
                report.removed_snapshots += Self::trim_key(&tx, &key, retain)?;
            }
            tx.commit()?;
        }
        Self::reclaim(&conn)?;
        Ok(report)
    }

    fn rollback_to(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM snapshots WHERE captured_at > ?1",
            [cutoff.timestamp_millis()],
        )?;
        Ok(removed)
    }
}
