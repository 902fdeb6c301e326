// src/engine/run.rs

//! One invocation, end to end:
//!
//! ```text
//! scheduler -> executor (with conditional validators) -> selector
//!           -> run transaction (staged) -> reporters -> commit | discard
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use crate::diff::{ChangeSelector, Classification, DiffRecord, Selection};
use crate::errors::{Result, SnapwatchError};
use crate::exec::{JobExecutor, RunOutcome};
use crate::fetch::conditional;
use crate::job::JobSpec;
use crate::report::{ReportSummary, ReporterSet};
use crate::store::{Snapshot, SnapshotStore};

use super::scheduler::{WorkerLimits, partition, run_phase};
use super::transaction::{CommitSummary, RunTransaction};

/// Shared, cheaply clonable pieces every job task needs.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn SnapshotStore>,
    executor: JobExecutor,
    selector: ChangeSelector,
    limits: WorkerLimits,
}

impl Engine {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        executor: JobExecutor,
        selector: ChangeSelector,
        limits: WorkerLimits,
    ) -> Self {
        Self {
            store,
            executor,
            selector,
            limits,
        }
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn limits(&self) -> WorkerLimits {
        self.limits
    }

    /// Execute and classify every job: light phase, then heavy phase.
    /// Results come back in job-file order.
    ///
    /// A store error in any job aborts the run; job-level failures do not,
    /// and a job whose task panics is reported as `error`.
    pub async fn evaluate(&self, jobs: Vec<JobSpec>) -> Result<Vec<(JobSpec, Selection)>> {
        let (light, heavy) = partition(jobs);

        let mut evaluated = Vec::with_capacity(light.len() + heavy.len());
        for (phase, jobs, workers) in [
            ("light", light, self.limits.light),
            ("heavy", heavy, self.limits.heavy),
        ] {
            let results = run_phase(
                phase,
                jobs,
                workers,
                |job| {
                    let engine = self.clone();
                    async move { engine.evaluate_one(job).await }
                },
                |job, reason| {
                    let selection = Selection::failed(&job, reason);
                    Ok((job, selection))
                },
            )
            .await;
            for result in results {
                evaluated.push(result?);
            }
        }
        evaluated.sort_by_key(|(job, _)| job.index);
        Ok(evaluated)
    }

    /// Fetch `job` unconditionally and classify it against stored history
    /// without staging anything. Backs the `test` command.
    pub async fn probe(&self, job: &JobSpec) -> Result<(RunOutcome, Selection)> {
        let history = self.history(job).await?;
        let outcome = self
            .executor
            .execute(job, &conditional::ConditionalValidators::none())
            .await;
        let selection = self.selector.select(job, outcome.clone(), &history);
        Ok((outcome, selection))
    }

    async fn history(&self, job: &JobSpec) -> Result<Vec<Snapshot>> {
        let store = Arc::clone(&self.store);
        let key = job.key().to_string();
        let limit = job.compared_versions.max(1);
        tokio::task::spawn_blocking(move || store.load_history(&key, limit))
            .await
            .map_err(|e| SnapwatchError::StoreIo(format!("history lookup task failed: {e}")))?
    }

    /// Load history, fetch (conditionally), classify.
    pub async fn evaluate_one(&self, job: JobSpec) -> Result<(JobSpec, Selection)> {
        let history = self.history(&job).await?;

        let validators = conditional::validators_for(&job, history.first());
        if !validators.is_empty() {
            debug!(job = %job.display_name(), ?validators, "conditional fetch");
        }

        let outcome = self.executor.execute(&job, &validators).await;
        let selection = self.selector.select(&job, outcome, &history);

        info!(
            job = %job.display_name(),
            classification = %selection.record.classification,
            "job evaluated"
        );
        Ok((job, selection))
    }
}

/// Which records reach the reporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportScope {
    All,
    ErrorsOnly,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub records: Vec<DiffRecord>,
    pub reporting: ReportSummary,
    pub committed: CommitSummary,
}

impl RunReport {
    pub fn error_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.classification == Classification::Error)
            .count()
    }
}

/// Evaluate `jobs`, report, then commit or discard `tx`.
///
/// The store is written only if every step up to and including reporting
/// succeeded.
pub async fn run_session(
    engine: &Engine,
    jobs: Vec<JobSpec>,
    mut tx: RunTransaction,
    reporters: &ReporterSet,
    scope: ReportScope,
) -> Result<RunReport> {
    let evaluated = engine.evaluate(jobs).await?;
    for (job, selection) in evaluated {
        tx.record(&job, selection);
    }

    let records: Vec<DiffRecord> = match scope {
        ReportScope::All => tx.records().to_vec(),
        ReportScope::ErrorsOnly => tx
            .records()
            .iter()
            .filter(|r| r.classification == Classification::Error)
            .cloned()
            .collect(),
    };

    let reporting = match reporters.dispatch(&records) {
        Ok(summary) => summary,
        Err(err) => {
            tx.discard();
            return Err(err);
        }
    };

    let records = tx.records().to_vec();
    let committed = tx.commit()?;
    Ok(RunReport {
        records,
        reporting,
        committed,
    })
}
