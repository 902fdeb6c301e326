// src/engine/transaction.rs

//! Staging buffer for one invocation's store writes.
//!
//! Selections are recorded as jobs finish. Nothing reaches the store until
//! [`RunTransaction::commit`] is called, which the caller does only after
//! reporting succeeded. Dropping or discarding the transaction leaves the
//! store exactly as it was before the run.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::diff::{DiffRecord, Selection};
use crate::errors::Result;
use crate::job::{JobKey, JobSpec};
use crate::store::{NewSnapshot, SnapshotStore};

/// Whether the run may write at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadWrite,
    /// Audit and test runs: commit is a no-op.
    ReadOnly,
}

/// One write waiting for commit.
#[derive(Debug, Clone)]
pub struct StagedWrite {
    pub job_key: JobKey,
    pub snapshot: NewSnapshot,
    pub max_snapshots: usize,
}

/// What a commit did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub written: usize,
}

pub struct RunTransaction {
    store: Arc<dyn SnapshotStore>,
    mode: TransactionMode,
    default_max_snapshots: usize,
    pending: Vec<StagedWrite>,
    records: Vec<DiffRecord>,
    finished: bool,
}

impl RunTransaction {
    pub fn open(
        store: Arc<dyn SnapshotStore>,
        mode: TransactionMode,
        default_max_snapshots: usize,
    ) -> Self {
        debug!(backend = store.backend(), ?mode, "run transaction opened");
        Self {
            store,
            mode,
            default_max_snapshots,
            pending: Vec::new(),
            records: Vec::new(),
            finished: false,
        }
    }

    /// Record a job's selection. `new`/`changed` results stage a write.
    pub fn record(&mut self, job: &JobSpec, selection: Selection) {
        if let Some(snapshot) = selection.pending {
            self.pending.push(StagedWrite {
                job_key: job.key().to_string(),
                snapshot,
                max_snapshots: job.max_snapshots.unwrap_or(self.default_max_snapshots),
            });
        }
        self.records.push(selection.record);
    }

    pub fn records(&self) -> &[DiffRecord] {
        &self.records
    }

    pub fn pending(&self) -> &[StagedWrite] {
        &self.pending
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Flush staged writes, one append per key. There is no cross-key
    /// atomicity: a store error stops the commit and is returned, and keys
    /// already appended stay appended.
    pub fn commit(mut self) -> Result<CommitSummary> {
        self.finished = true;

        if self.mode == TransactionMode::ReadOnly {
            debug!(staged = self.pending.len(), "read-only run; nothing committed");
            return Ok(CommitSummary::default());
        }

        let mut summary = CommitSummary::default();
        for write in std::mem::take(&mut self.pending) {
            let stored = self
                .store
                .append(&write.job_key, write.snapshot, write.max_snapshots)?;
            debug!(
                job = %write.job_key,
                sequence = stored.sequence,
                max_snapshots = write.max_snapshots,
                "snapshot committed"
            );
            summary.written += 1;
        }

        info!(written = summary.written, backend = self.store.backend(), "run committed");
        Ok(summary)
    }

    /// Drop every staged write.
    pub fn discard(mut self) {
        self.finished = true;
        if !self.pending.is_empty() {
            warn!(discarded = self.pending.len(), "run discarded; store left untouched");
        }
    }
}

impl Drop for RunTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.pending.is_empty() {
            warn!(
                discarded = self.pending.len(),
                "run transaction dropped without commit"
            );
        }
    }
}
