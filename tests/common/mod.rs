#![allow(dead_code)]

use std::sync::Arc;

use snapwatch::diff::Differ;
use snapwatch::engine::{
    Engine, ReportScope, RunReport, RunTransaction, TransactionMode, run_session,
};
use snapwatch::errors::Result;
use snapwatch::job::JobSpec;
use snapwatch::report::{Reporter, ReporterSet};
use snapwatch::store::SnapshotStore;
use snapwatch::types::ReferenceSelection;
use snapwatch_test_utils::{ConfigFileBuilder, FakeFetcher, RecordingReporter, test_engine};

pub use snapwatch_test_utils::init_tracing;

/// Validated job specs for a list of raw job tables.
pub fn jobs(configs: Vec<snapwatch::config::JobConfig>) -> Vec<JobSpec> {
    let mut builder = ConfigFileBuilder::new();
    for cfg in configs {
        builder = builder.with_job(cfg);
    }
    builder.build().jobs
}

pub struct Harness {
    pub store: Arc<dyn SnapshotStore>,
    pub fetcher: Arc<FakeFetcher>,
    pub engine: Engine,
    pub max_snapshots: usize,
}

impl Harness {
    pub fn new(store: Arc<dyn SnapshotStore>, differ: Arc<dyn Differ>) -> Self {
        let fetcher = FakeFetcher::new();
        let engine = test_engine(
            Arc::clone(&store),
            fetcher.clone(),
            differ,
            ReferenceSelection::Closest,
        );
        Self {
            store,
            fetcher,
            engine,
            max_snapshots: 4,
        }
    }

    /// One full read-write run reported to a single recording channel.
    pub async fn run(&self, jobs: &[JobSpec]) -> Result<(RunReport, Arc<RecordingReporter>)> {
        let recorder = RecordingReporter::new();
        let reporters = ReporterSet::new().push(recorder.clone(), true);
        let report = self.run_with(jobs, &reporters).await?;
        Ok((report, recorder))
    }

    pub async fn run_with(&self, jobs: &[JobSpec], reporters: &ReporterSet) -> Result<RunReport> {
        let tx = RunTransaction::open(
            Arc::clone(&self.store),
            TransactionMode::ReadWrite,
            self.max_snapshots,
        );
        run_session(&self.engine, jobs.to_vec(), tx, reporters, ReportScope::All).await
    }

    pub fn reporters(channels: Vec<(Arc<dyn Reporter>, bool)>) -> ReporterSet {
        channels
            .into_iter()
            .fold(ReporterSet::new(), |set, (r, fatal)| set.push(r, fatal))
    }

    /// Stored contents for `key`, newest first.
    pub fn contents(&self, key: &str) -> Vec<String> {
        self.store
            .load_history(key, 0)
            .unwrap()
            .into_iter()
            .map(|s| String::from_utf8(s.content).unwrap())
            .collect()
    }
}
