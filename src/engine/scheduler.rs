// src/engine/scheduler.rs

//! Two-phase bounded-parallelism scheduler.
//!
//! Jobs are split into a light class and a heavy class (those needing the
//! rendering engine). The light phase runs first, then the heavy phase, each
//! with its own worker count:
//!
//! ```text
//! light = min(light_max_workers, cpus * light_workers_per_cpu)
//! heavy = min(cpus, available_memory / heavy_instance_memory)   (>= 1)
//! ```
//!
//! `max_workers` caps both. Audit runs force a single worker.

use std::collections::HashMap;
use std::future::Future;
use std::thread;

use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::config::ConfigSection;
use crate::job::JobSpec;

/// Worker counts for both phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLimits {
    pub light: usize,
    pub heavy: usize,
}

impl WorkerLimits {
    /// Limits for this host.
    pub fn detect(cfg: &ConfigSection, cli_max: Option<usize>, audit: bool) -> Self {
        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::compute(cfg, cpus, available_memory_bytes(), cli_max, audit)
    }

    /// Pure form of [`detect`](Self::detect).
    pub fn compute(
        cfg: &ConfigSection,
        cpus: usize,
        available_memory: Option<u64>,
        cli_max: Option<usize>,
        audit: bool,
    ) -> Self {
        if audit {
            return Self { light: 1, heavy: 1 };
        }

        let cpus = cpus.max(1);
        let light = cfg
            .light_max_workers
            .min(cpus.saturating_mul(cfg.light_workers_per_cpu));

        let heavy = match available_memory {
            Some(bytes) => {
                let budget = cfg.heavy_instance_memory_mb.saturating_mul(1024 * 1024).max(1);
                let by_memory = usize::try_from(bytes / budget).unwrap_or(usize::MAX);
                cpus.min(by_memory)
            }
            None => cpus,
        };

        let cap = cli_max.or(cfg.max_workers).unwrap_or(usize::MAX);
        Self {
            light: light.min(cap).max(1),
            heavy: heavy.min(cap).max(1),
        }
    }
}

/// `MemAvailable` from `/proc/meminfo`, if the host exposes it.
pub fn available_memory_bytes() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_available(&meminfo)
}

fn parse_mem_available(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|l| l.starts_with("MemAvailable:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

/// Split into (light, heavy), preserving file order within each class.
pub fn partition(jobs: Vec<JobSpec>) -> (Vec<JobSpec>, Vec<JobSpec>) {
    jobs.into_iter().partition(|job| !job.is_heavy())
}

/// Run `work` for every job with at most `workers` in flight.
///
/// Results come back in job-file order. A job whose task panics (or is
/// cancelled) yields `on_abort(job, reason)` in its slot; its siblings are
/// unaffected.
pub async fn run_phase<F, Fut, A, T>(
    phase: &str,
    jobs: Vec<JobSpec>,
    workers: usize,
    work: F,
    on_abort: A,
) -> Vec<T>
where
    F: Fn(JobSpec) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    A: Fn(JobSpec, String) -> T,
    T: Send + 'static,
{
    if jobs.is_empty() {
        return Vec::new();
    }

    let workers = workers.max(1);
    info!(phase, jobs = jobs.len(), workers, "starting phase");

    let mut phase_state = Phase {
        name: phase,
        set: JoinSet::new(),
        in_flight: HashMap::with_capacity(workers),
        results: Vec::with_capacity(jobs.len()),
    };

    for job in jobs {
        while phase_state.set.len() >= workers {
            phase_state.collect_one(&on_abort).await;
        }
        let index = job.index;
        debug!(phase, job = %job.display_name(), "dispatching");
        let fut = work(job.clone());
        let handle = phase_state.set.spawn(async move { (index, fut.await) });
        phase_state.in_flight.insert(handle.id(), job);
    }
    while !phase_state.set.is_empty() {
        phase_state.collect_one(&on_abort).await;
    }

    let mut results = phase_state.results;
    results.sort_by_key(|(index, _)| *index);
    debug!(phase, completed = results.len(), "phase finished");
    results.into_iter().map(|(_, r)| r).collect()
}

struct Phase<'p, T> {
    name: &'p str,
    set: JoinSet<(usize, T)>,
    in_flight: HashMap<task::Id, JobSpec>,
    results: Vec<(usize, T)>,
}

impl<T: Send + 'static> Phase<'_, T> {
    async fn collect_one<A>(&mut self, on_abort: &A)
    where
        A: Fn(JobSpec, String) -> T,
    {
        match self.set.join_next_with_id().await {
            Some(Ok((id, item))) => {
                self.in_flight.remove(&id);
                self.results.push(item);
            }
            Some(Err(err)) => {
                let id = err.id();
                let reason = abort_reason(err);
                warn!(phase = self.name, error = %reason, "job task aborted");
                if let Some(job) = self.in_flight.remove(&id) {
                    let index = job.index;
                    self.results.push((index, on_abort(job, reason)));
                }
            }
            None => {}
        }
    }
}

fn abort_reason(err: JoinError) -> String {
    if !err.is_panic() {
        return "job task was cancelled".to_string();
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("job task panicked: {message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cfg() -> ConfigSection {
        ConfigSection::default()
    }

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn light_formula() {
        let limits = WorkerLimits::compute(&cfg(), 4, None, None, false);
        assert_eq!(limits.light, 20);

        let limits = WorkerLimits::compute(&cfg(), 32, None, None, false);
        assert_eq!(limits.light, 64);
    }

    #[test]
    fn heavy_formula_uses_memory_then_cpus() {
        // 512 MiB per instance, 1 GiB free -> 2
        let limits = WorkerLimits::compute(&cfg(), 8, Some(GIB), None, false);
        assert_eq!(limits.heavy, 2);

        let limits = WorkerLimits::compute(&cfg(), 8, Some(64 * GIB), None, false);
        assert_eq!(limits.heavy, 8);

        let limits = WorkerLimits::compute(&cfg(), 8, None, None, false);
        assert_eq!(limits.heavy, 8);

        let limits = WorkerLimits::compute(&cfg(), 8, Some(1024), None, false);
        assert_eq!(limits.heavy, 1);
    }

    #[test]
    fn caps_and_audit() {
        let mut c = cfg();
        c.max_workers = Some(3);
        let limits = WorkerLimits::compute(&c, 8, Some(64 * GIB), None, false);
        assert_eq!(limits, WorkerLimits { light: 3, heavy: 3 });

        let limits = WorkerLimits::compute(&c, 8, Some(64 * GIB), Some(2), false);
        assert_eq!(limits, WorkerLimits { light: 2, heavy: 2 });

        let limits = WorkerLimits::compute(&cfg(), 8, Some(64 * GIB), None, true);
        assert_eq!(limits, WorkerLimits { light: 1, heavy: 1 });
    }

    #[test]
    fn meminfo_parsing() {
        let sample = "MemTotal:       16000000 kB\nMemFree:         1000000 kB\nMemAvailable:    2000000 kB\n";
        assert_eq!(parse_mem_available(sample), Some(2_000_000 * 1024));
        assert_eq!(parse_mem_available("MemTotal: 1 kB\n"), None);
    }

    fn jobs(n: usize) -> Vec<JobSpec> {
        (1..=n)
            .map(|i| {
                let cfg: crate::config::RawConfigFile =
                    toml::from_str(&format!("[[job]]\ncommand = \"echo {i}\"\n")).unwrap();
                let mut spec = crate::config::ConfigFile::try_from(cfg).unwrap().jobs.remove(0);
                spec.index = i;
                spec
            })
            .collect()
    }

    #[tokio::test]
    async fn phase_respects_worker_bound_and_order() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = run_phase(
            "light",
            jobs(10),
            3,
            |job| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5 * (11 - job.index as u64))).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    job.index
                }
            },
            |_, _| 0,
        )
        .await;

        assert_eq!(results, (1..=10).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn panicking_job_keeps_its_slot() {
        let results = run_phase(
            "light",
            jobs(3),
            2,
            |job| async move {
                if job.index == 1 {
                    panic!("boom in {}", job.key());
                }
                format!("ok {}", job.index)
            },
            |job, reason| format!("aborted {}: {reason}", job.index),
        )
        .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], "aborted 1: job task panicked: boom in echo 1");
        assert_eq!(&results[1..], ["ok 2", "ok 3"]);
    }
}
