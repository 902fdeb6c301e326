// src/report/mod.rs

//! Reporting channels.
//!
//! A [`Reporter`] receives the whole run's [`DiffRecord`]s in one call.
//! [`ReporterSet`] invokes every enabled channel and decides whether the
//! reporting phase as a whole succeeded: a failing channel is logged, and
//! only a channel marked `fatal` fails the phase (which in turn discards
//! the run transaction).

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::ReporterConfig;
use crate::diff::{Classification, DiffRecord};
use crate::errors::{Result, SnapwatchError};
use crate::types::ReporterKind;

pub mod json;
pub mod text;

pub use json::JsonReporter;
pub use text::TextReporter;

pub trait Reporter: Send + Sync {
    fn name(&self) -> &str;

    fn send(&self, records: &[DiffRecord]) -> Result<()>;
}

/// Outcome of a reporting phase that did not fail fatally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub delivered: usize,
    /// Names of non-fatal channels that failed.
    pub failed: Vec<String>,
}

struct Channel {
    reporter: Arc<dyn Reporter>,
    fatal: bool,
}

/// The enabled channels of one invocation.
#[derive(Default)]
pub struct ReporterSet {
    channels: Vec<Channel>,
}

impl ReporterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, reporter: Arc<dyn Reporter>, fatal: bool) -> Self {
        self.channels.push(Channel { reporter, fatal });
        self
    }

    /// Channels from `[[reporter]]`; a plain stdout channel when none is
    /// configured.
    pub fn from_config(configs: &[ReporterConfig]) -> Self {
        let mut set = Self::new();
        for cfg in configs.iter().filter(|c| c.enabled) {
            let reporter: Arc<dyn Reporter> = match (cfg.kind, &cfg.path) {
                (ReporterKind::Json, Some(path)) => Arc::new(JsonReporter::new(path.clone())),
                (ReporterKind::Json, None) => {
                    warn!("json reporter without a path; skipped");
                    continue;
                }
                (ReporterKind::Stdout, _) => Arc::new(TextReporter::stdout(cfg.show_unchanged)),
            };
            set = set.push(reporter, cfg.fatal);
        }
        if set.channels.is_empty() {
            set = set.push(Arc::new(TextReporter::stdout(false)), false);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Send `records` to every channel. Returns `Err(Reporting)` if a fatal
    /// channel failed; every channel is still attempted first.
    pub fn dispatch(&self, records: &[DiffRecord]) -> Result<ReportSummary> {
        let mut summary = ReportSummary::default();
        let mut fatal_failure = None;

        for channel in &self.channels {
            let name = channel.reporter.name().to_string();
            match channel.reporter.send(records) {
                Ok(()) => {
                    info!(reporter = %name, records = records.len(), "report delivered");
                    summary.delivered += 1;
                }
                Err(err) if channel.fatal => {
                    error!(reporter = %name, error = %err, "fatal reporter failed");
                    fatal_failure.get_or_insert(SnapwatchError::Reporting {
                        reporter: name,
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    warn!(reporter = %name, error = %err, "reporter failed");
                    summary.failed.push(name);
                }
            }
        }

        match fatal_failure {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }
}

/// Per-category counts, for summary lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub error: usize,
}

impl Counts {
    pub fn of(records: &[DiffRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.classification {
                Classification::New => counts.new += 1,
                Classification::Changed => counts.changed += 1,
                Classification::Unchanged => counts.unchanged += 1,
                Classification::Error => counts.error += 1,
            }
        }
        counts
    }
}
