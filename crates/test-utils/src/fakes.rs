use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use snapwatch::diff::{DiffOptions, DiffPayload, DiffRecord, Differ, UnifiedDiffer};
use snapwatch::errors::{Result, SnapwatchError};
use snapwatch::fetch::{
    ConditionalValidators, FailureKind, FetchFuture, Fetched, Fetcher, JobFailure,
};
use snapwatch::job::JobSpec;
use snapwatch::report::Reporter;
use snapwatch::store::{
    Capabilities, MaintenanceReport, NewSnapshot, Snapshot, SnapshotStore, Validators,
};

type Answer = std::result::Result<Fetched, JobFailure>;

#[derive(Default)]
struct Script {
    queue: VecDeque<Answer>,
    last: Option<Answer>,
}

/// A fetcher that:
/// - answers from a per-key script, in order; once the script runs dry
///   the last answer served repeats
/// - records every call together with the validators it was given.
#[derive(Default)]
pub struct FakeFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(String, ConditionalValidators)>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, key: &str, answer: Answer) {
        self.scripts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .queue
            .push_back(answer);
    }

    pub fn body(&self, key: &str, content: &str) {
        self.respond(key, Ok(Fetched::body(content.as_bytes().to_vec())));
    }

    pub fn body_with_etag(&self, key: &str, content: &str, etag: &str) {
        let mut fetched = Fetched::body(content.as_bytes().to_vec());
        fetched.validators = Validators {
            etag: Some(etag.to_string()),
            last_modified: None,
        };
        self.respond(key, Ok(fetched));
    }

    pub fn not_modified(&self, key: &str) {
        self.respond(key, Ok(Fetched::not_modified()));
    }

    pub fn fail(&self, key: &str, kind: FailureKind) {
        self.respond(key, Err(JobFailure::new(kind, "scripted failure")));
    }

    pub fn calls(&self) -> Vec<(String, ConditionalValidators)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, key: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(k, _)| k == key).count()
    }
}

impl Fetcher for FakeFetcher {
    fn fetch<'a>(
        &'a self,
        job: &'a JobSpec,
        conditional: &'a ConditionalValidators,
    ) -> FetchFuture<'a> {
        let key = job.key().to_string();
        self.calls
            .lock()
            .unwrap()
            .push((key.clone(), conditional.clone()));

        let answer = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.get_mut(&key).and_then(|script| {
                if let Some(next) = script.queue.pop_front() {
                    script.last = Some(next);
                }
                script.last.clone()
            })
        };

        Box::pin(async move {
            answer.unwrap_or_else(|| {
                Err(JobFailure::new(
                    FailureKind::Connection,
                    format!("no scripted response for {key}"),
                ))
            })
        })
    }
}

/// Fetcher that panics for one key and defers to a [`FakeFetcher`]
/// for every other.
pub struct PanickingFetcher {
    key: String,
    inner: Arc<FakeFetcher>,
}

impl PanickingFetcher {
    pub fn new(key: &str, inner: Arc<FakeFetcher>) -> Arc<Self> {
        Arc::new(Self {
            key: key.to_string(),
            inner,
        })
    }
}

impl Fetcher for PanickingFetcher {
    fn fetch<'a>(
        &'a self,
        job: &'a JobSpec,
        conditional: &'a ConditionalValidators,
    ) -> FetchFuture<'a> {
        if job.key() == self.key {
            panic!("fetcher crashed on {}", self.key);
        }
        self.inner.fetch(job, conditional)
    }
}

/// Unified differ that counts how often it is asked to compare.
#[derive(Default)]
pub struct CountingDiffer {
    calls: AtomicUsize,
}

impl CountingDiffer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Differ for CountingDiffer {
    fn compare(
        &self,
        old: &[u8],
        new: &[u8],
        options: &DiffOptions,
    ) -> std::result::Result<DiffPayload, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        UnifiedDiffer.compare(old, new, options)
    }
}

/// Reporter that keeps every batch it receives.
#[derive(Default)]
pub struct RecordingReporter {
    batches: Mutex<Vec<Vec<DiffRecord>>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn batches(&self) -> Vec<Vec<DiffRecord>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn last(&self) -> Vec<DiffRecord> {
        self.batches.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl Reporter for RecordingReporter {
    fn name(&self) -> &str {
        "recording"
    }

    fn send(&self, records: &[DiffRecord]) -> Result<()> {
        self.batches.lock().unwrap().push(records.to_vec());
        Ok(())
    }
}

/// Reporter that always fails.
pub struct FailingReporter;

impl Reporter for FailingReporter {
    fn name(&self) -> &str {
        "failing"
    }

    fn send(&self, _records: &[DiffRecord]) -> Result<()> {
        Err(SnapwatchError::Other(anyhow::anyhow!("channel unavailable")))
    }
}

/// Store wrapper whose history lookups fail for one key. Every other call
/// goes to `inner`; appends are counted.
pub struct FailingStore {
    inner: Arc<dyn SnapshotStore>,
    broken_key: String,
    appends: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn SnapshotStore>, broken_key: &str) -> Arc<Self> {
        Arc::new(Self {
            inner,
            broken_key: broken_key.to_string(),
            appends: AtomicUsize::new(0),
        })
    }

    pub fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn load_history(&self, key: &str, limit: usize) -> Result<Vec<Snapshot>> {
        if key == self.broken_key {
            return Err(SnapwatchError::StoreIo(format!("disk error reading '{key}'")));
        }
        self.inner.load_history(key, limit)
    }

    fn append(&self, key: &str, snapshot: NewSnapshot, max_snapshots: usize) -> Result<Snapshot> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.inner.append(key, snapshot, max_snapshots)
    }

    fn delete_latest(&self, key: &str) -> Result<bool> {
        self.inner.delete_latest(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }

    fn gc(&self, active: &HashSet<String>, retain: usize) -> Result<MaintenanceReport> {
        self.inner.gc(active, retain)
    }

    fn compact(&self, retain: usize) -> Result<MaintenanceReport> {
        self.inner.compact(retain)
    }

    fn rollback_to(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<usize> {
        self.inner.rollback_to(cutoff)
    }
}
