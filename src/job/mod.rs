// src/job/mod.rs

//! Immutable per-run job descriptions.
//!
//! A [`JobSpec`] is built once from the validated config and handed through
//! the scheduler by value; nothing mutates it during a run.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::filter::FilterPipeline;

/// Canonical job key type (URL or command string).
pub type JobKey = String;

/// How a job obtains its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Plain HTTP(S) fetch.
    Url,
    /// HTTP fetch through an external rendering engine.
    Browser,
    /// Output of a local shell command.
    Command,
}

impl JobKind {
    /// Heavy jobs need the rendering engine and run in the second phase.
    pub fn is_heavy(self) -> bool {
        matches!(self, JobKind::Browser)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::Url => "url",
            JobKind::Browser => "browser",
            JobKind::Command => "command",
        };
        f.write_str(s)
    }
}

/// One entry of `ignore_http_error_codes`: either an exact status or a
/// whole class such as `4xx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMatcher {
    Exact(u16),
    Class(u16),
}

impl StatusMatcher {
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_lowercase();
        if let Some(prefix) = s.strip_suffix("xx") {
            let class: u16 = prefix.parse().ok()?;
            return (1..=5).contains(&class).then_some(StatusMatcher::Class(class));
        }
        let code: u16 = s.parse().ok()?;
        (100..=599).contains(&code).then_some(StatusMatcher::Exact(code))
    }

    pub fn matches(&self, status: u16) -> bool {
        match *self {
            StatusMatcher::Exact(code) => code == status,
            StatusMatcher::Class(class) => status / 100 == class,
        }
    }
}

/// Per-job error tolerance flags. A tolerated error leaves the previous
/// state standing instead of being reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorTolerance {
    pub connection: bool,
    pub timeout: bool,
    pub too_many_redirects: bool,
    pub http_status: Vec<StatusMatcher>,
}

impl ErrorTolerance {
    pub fn tolerates_status(&self, status: u16) -> bool {
        self.http_status.iter().any(|m| m.matches(status))
    }
}

/// Immutable job configuration for one invocation.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// 1-based position in the job file (as shown by `list`).
    pub index: usize,
    pub name: Option<String>,
    pub kind: JobKind,
    /// URL for `Url`/`Browser` jobs, shell command for `Command` jobs.
    pub location: String,
    pub headers: BTreeMap<String, String>,
    pub max_tries: u32,
    /// `None` means unbounded.
    pub timeout: Option<Duration>,
    pub compared_versions: usize,
    pub max_snapshots: Option<usize>,
    /// Whether to send cache validators from the previous snapshot.
    pub conditional: bool,
    pub tolerance: ErrorTolerance,
    pub filters: FilterPipeline,
    pub enabled: bool,
}

impl JobSpec {
    /// Unique key under which snapshots are stored.
    pub fn key(&self) -> &str {
        &self.location
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.location)
    }

    pub fn is_heavy(&self) -> bool {
        self.kind.is_heavy()
    }

    /// Conditional retrieval only makes sense for network fetches.
    pub fn uses_conditional_fetch(&self) -> bool {
        self.conditional && matches!(self.kind, JobKind::Url)
    }
}

/// Resolve a CLI job selector (1-based index, exact key or job name)
/// against the set.
pub fn select<'a>(jobs: &'a [JobSpec], selector: &str) -> Option<&'a JobSpec> {
    if let Ok(idx) = selector.parse::<usize>() {
        if let Some(job) = jobs.iter().find(|j| j.index == idx) {
            return Some(job);
        }
    }
    jobs.iter()
        .find(|j| j.key() == selector)
        .or_else(|| jobs.iter().find(|j| j.name.as_deref() == Some(selector)))
}
