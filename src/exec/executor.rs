// src/exec/executor.rs

//! Single-job executor.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::fetch::{ConditionalValidators, Fetched, FetcherSet, JobFailure};
use crate::job::{JobKey, JobSpec};
use crate::store::Validators;

use super::backoff::{DEFAULT_RETRY_BASE, retry_delay};

/// How a single execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// Full content was obtained and filtered.
    Fetched,
    /// The server confirmed the latest snapshot is still current.
    NotModified,
    /// All attempts failed (or the failure was not retryable).
    Failed(JobFailure),
}

/// Transient result of executing one job once. Consumed by the change
/// selector.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub job_key: JobKey,
    /// Post-filter content; empty unless `status` is `Fetched`.
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    pub validators: Validators,
    pub status: FetchStatus,
    pub elapsed: Duration,
    pub tries: u32,
}

impl RunOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, FetchStatus::Failed(_))
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match &self.status {
            FetchStatus::Failed(f) => Some(f),
            _ => None,
        }
    }
}

/// Runs jobs through the fetcher matching their kind.
#[derive(Clone)]
pub struct JobExecutor {
    fetchers: FetcherSet,
    retry_base: Duration,
}

impl JobExecutor {
    pub fn new(fetchers: FetcherSet) -> Self {
        Self {
            fetchers,
            retry_base: DEFAULT_RETRY_BASE,
        }
    }

    /// Override the base retry delay (tests use `Duration::ZERO`).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Execute `job` once, retrying transient failures up to `max_tries`.
    ///
    /// Never returns an error: failures are folded into the outcome so
    /// sibling jobs are unaffected.
    pub async fn execute(&self, job: &JobSpec, conditional: &ConditionalValidators) -> RunOutcome {
        let started = Instant::now();
        let max_tries = job.max_tries.max(1);
        let mut tries = 0;

        let result = loop {
            tries += 1;
            match self.attempt(job, conditional).await {
                Ok(fetched) => break Ok(fetched),
                Err(failure) if failure.is_transient() && tries < max_tries => {
                    let delay = retry_delay(self.retry_base, tries);
                    warn!(
                        job = %job.display_name(),
                        attempt = tries,
                        max_tries,
                        error = %failure,
                        delay_ms = delay.as_millis() as u64,
                        "fetch attempt failed; retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(failure) => break Err(failure),
            }
        };

        let mut outcome = RunOutcome {
            job_key: job.key().to_string(),
            content: Vec::new(),
            content_type: None,
            validators: Validators::default(),
            status: FetchStatus::Fetched,
            elapsed: Duration::ZERO,
            tries,
        };

        match result {
            Ok(fetched) if fetched.not_modified => {
                outcome.status = FetchStatus::NotModified;
            }
            Ok(fetched) => match job.filters.apply(fetched.content, fetched.content_type.as_deref()) {
                Ok(content) => {
                    outcome.content = content;
                    outcome.content_type = fetched.content_type;
                    outcome.validators = fetched.validators;
                }
                Err(msg) => {
                    outcome.status = FetchStatus::Failed(JobFailure::content(msg));
                }
            },
            Err(failure) => {
                outcome.status = FetchStatus::Failed(failure);
            }
        }

        outcome.elapsed = started.elapsed();
        match &outcome.status {
            FetchStatus::Failed(failure) => info!(
                job = %job.display_name(),
                tries,
                error = %failure,
                "job failed"
            ),
            status => debug!(
                job = %job.display_name(),
                tries,
                ?status,
                bytes = outcome.content.len(),
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "job executed"
            ),
        }
        outcome
    }

    async fn attempt(
        &self,
        job: &JobSpec,
        conditional: &ConditionalValidators,
    ) -> Result<Fetched, JobFailure> {
        let fetch = self.fetchers.for_kind(job.kind).fetch(job, conditional);
        match job.timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .unwrap_or_else(|_| Err(JobFailure::timeout(limit))),
            None => fetch.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FailureKind, FetchFuture, Fetcher};
    use crate::filter::FilterPipeline;
    use crate::job::{ErrorTolerance, JobKind};
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::{Arc, Mutex};

    struct Scripted(Mutex<VecDeque<Result<Fetched, JobFailure>>>);

    impl Scripted {
        fn new(items: Vec<Result<Fetched, JobFailure>>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(items.into())))
        }
    }

    impl Fetcher for Scripted {
        fn fetch<'a>(
            &'a self,
            _job: &'a JobSpec,
            _conditional: &'a ConditionalValidators,
        ) -> FetchFuture<'a> {
            let next = self
                .0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(JobFailure::content("script exhausted")));
            Box::pin(async move { next })
        }
    }

    struct Sleepy;

    impl Fetcher for Sleepy {
        fn fetch<'a>(
            &'a self,
            _job: &'a JobSpec,
            _conditional: &'a ConditionalValidators,
        ) -> FetchFuture<'a> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Fetched::body(b"late".to_vec()))
            })
        }
    }

    fn job(max_tries: u32, filters: &[&str]) -> JobSpec {
        JobSpec {
            index: 1,
            name: None,
            kind: JobKind::Url,
            location: "https://example.org/".into(),
            headers: BTreeMap::new(),
            max_tries,
            timeout: None,
            compared_versions: 1,
            max_snapshots: None,
            conditional: true,
            tolerance: ErrorTolerance::default(),
            filters: FilterPipeline::from_specs(filters).unwrap(),
            enabled: true,
        }
    }

    fn executor(fetcher: Arc<dyn Fetcher>) -> JobExecutor {
        JobExecutor::new(FetcherSet::uniform(fetcher)).with_retry_base(Duration::ZERO)
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let fetcher = Scripted::new(vec![
            Err(JobFailure::new(FailureKind::Connection, "refused")),
            Err(JobFailure::new(FailureKind::HttpStatus(502), "bad gateway")),
            Ok(Fetched::body(b"ok".to_vec())),
        ]);
        let outcome = executor(fetcher)
            .execute(&job(3, &[]), &ConditionalValidators::none())
            .await;
        assert_eq!(outcome.status, FetchStatus::Fetched);
        assert_eq!(outcome.tries, 3);
        assert_eq!(outcome.content, b"ok");
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let fetcher = Scripted::new(vec![
            Err(JobFailure::new(FailureKind::HttpStatus(404), "not found")),
            Ok(Fetched::body(b"never".to_vec())),
        ]);
        let outcome = executor(fetcher)
            .execute(&job(5, &[]), &ConditionalValidators::none())
            .await;
        assert_eq!(outcome.tries, 1);
        assert_eq!(outcome.failure().map(|f| f.kind), Some(FailureKind::HttpStatus(404)));
    }

    #[tokio::test]
    async fn filters_run_on_fetched_content() {
        let fetcher = Scripted::new(vec![Ok(Fetched::body(b"  b\na  \n".to_vec()))]);
        let outcome = executor(fetcher)
            .execute(&job(1, &["strip", "sort"]), &ConditionalValidators::none())
            .await;
        assert_eq!(outcome.content, b"a\nb");
    }

    #[tokio::test]
    async fn filter_errors_become_content_failures() {
        let fetcher = Scripted::new(vec![Ok(Fetched::body(vec![0xff, 0xfe]))]);
        let outcome = executor(fetcher)
            .execute(&job(3, &["utf8"]), &ConditionalValidators::none())
            .await;
        assert_eq!(outcome.failure().map(|f| f.kind), Some(FailureKind::Content));
        assert_eq!(outcome.tries, 1);
    }

    #[tokio::test]
    async fn not_modified_passes_through() {
        let fetcher = Scripted::new(vec![Ok(Fetched::not_modified())]);
        let outcome = executor(fetcher)
            .execute(&job(1, &[]), &ConditionalValidators::none())
            .await;
        assert_eq!(outcome.status, FetchStatus::NotModified);
        assert!(outcome.content.is_empty());
    }

    #[tokio::test]
    async fn timeout_bounds_each_attempt() {
        let mut spec = job(2, &[]);
        spec.timeout = Some(Duration::from_millis(50));
        let outcome = executor(Arc::new(Sleepy))
            .execute(&spec, &ConditionalValidators::none())
            .await;
        assert_eq!(outcome.tries, 2);
        assert_eq!(outcome.failure().map(|f| f.kind), Some(FailureKind::Timeout));
    }
}
