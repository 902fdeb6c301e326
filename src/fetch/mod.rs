// src/fetch/mod.rs

//! Content retrieval.
//!
//! - [`Fetcher`] abstracts how one job's content is obtained. There is one
//!   implementation per [`JobKind`]: [`http`] (plain network fetch),
//!   [`browser`] (external rendering engine) and [`command`] (local shell
//!   command).
//! - [`conditional`] is the conditional-retrieval coordinator: it derives
//!   cache validators from the latest snapshot and recognises "not modified"
//!   answers.
//!
//! Failures are values ([`JobFailure`]), not errors, so the executor can
//! retry, tolerate or report them without aborting sibling jobs.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::SnapwatchError;
use crate::job::{ErrorTolerance, JobKind, JobSpec};
use crate::store::Validators;

pub mod browser;
pub mod command;
pub mod conditional;
pub mod http;

pub use browser::BrowserFetcher;
pub use command::CommandFetcher;
pub use conditional::ConditionalValidators;
pub use http::HttpFetcher;

/// Category of a per-job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Connection,
    Timeout,
    TooManyRedirects,
    HttpStatus(u16),
    /// Local command or rendering engine exited unsuccessfully.
    Process(Option<i32>),
    /// Filter or differ failure.
    Content,
}

/// A job-level failure, isolated to that job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("timed out after {}s", after.as_secs_f32()),
        )
    }

    pub fn content(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Content, message)
    }

    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            FailureKind::Connection | FailureKind::Timeout | FailureKind::Process(_) => true,
            FailureKind::HttpStatus(code) => code >= 500,
            FailureKind::TooManyRedirects | FailureKind::Content => false,
        }
    }

    /// Escalate to a crate error, for callers that treat a job failure as
    /// fatal (the `test` command).
    pub fn into_error(self, key: &str) -> SnapwatchError {
        match self.kind {
            FailureKind::Content => SnapwatchError::Content {
                key: key.to_string(),
                message: self.message,
            },
            _ => SnapwatchError::TransientFetch {
                key: key.to_string(),
                message: self.to_string(),
            },
        }
    }

    /// Whether the job's configuration says to ignore this failure.
    pub fn is_tolerated_by(&self, tolerance: &ErrorTolerance) -> bool {
        match self.kind {
            FailureKind::Connection => tolerance.connection,
            FailureKind::Timeout => tolerance.timeout,
            FailureKind::TooManyRedirects => tolerance.too_many_redirects,
            FailureKind::HttpStatus(code) => tolerance.tolerates_status(code),
            FailureKind::Process(_) | FailureKind::Content => false,
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::HttpStatus(code) => write!(f, "HTTP {code}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// What a fetcher hands back on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fetched {
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    pub validators: Validators,
    /// The server answered "not modified"; `content` is empty.
    pub not_modified: bool,
}

impl Fetched {
    pub fn body(content: Vec<u8>) -> Self {
        Self {
            content,
            ..Default::default()
        }
    }

    pub fn not_modified() -> Self {
        Self {
            not_modified: true,
            ..Default::default()
        }
    }
}

pub type FetchResult = Result<Fetched, JobFailure>;

/// Boxed future returned by [`Fetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = FetchResult> + Send + 'a>>;

/// Obtains the current content of one job.
///
/// Implementations must not touch the snapshot store; validators arrive
/// pre-computed in `conditional`.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        job: &'a JobSpec,
        conditional: &'a ConditionalValidators,
    ) -> FetchFuture<'a>;
}

/// One fetcher per job kind.
#[derive(Clone)]
pub struct FetcherSet {
    url: Arc<dyn Fetcher>,
    browser: Arc<dyn Fetcher>,
    command: Arc<dyn Fetcher>,
}

impl FetcherSet {
    pub fn new(url: Arc<dyn Fetcher>, browser: Arc<dyn Fetcher>, command: Arc<dyn Fetcher>) -> Self {
        Self {
            url,
            browser,
            command,
        }
    }

    /// Route every kind to the same fetcher (tests, scripted sources).
    pub fn uniform(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new(Arc::clone(&fetcher), Arc::clone(&fetcher), fetcher)
    }

    pub fn for_kind(&self, kind: JobKind) -> &dyn Fetcher {
        match kind {
            JobKind::Url => self.url.as_ref(),
            JobKind::Browser => self.browser.as_ref(),
            JobKind::Command => self.command.as_ref(),
        }
    }
}
