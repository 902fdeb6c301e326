// src/fetch/command.rs

//! Local shell-command jobs.
//!
//! The job's location is run through the platform shell and its stdout
//! becomes the content. stderr is drained and logged at debug level.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::job::JobSpec;

use super::{
    ConditionalValidators, FailureKind, FetchFuture, FetchResult, Fetched, Fetcher, JobFailure,
};

/// Runs `JobKind::Command` jobs.
#[derive(Debug, Default, Clone)]
pub struct CommandFetcher;

impl CommandFetcher {
    pub fn new() -> Self {
        Self
    }
}

impl Fetcher for CommandFetcher {
    fn fetch<'a>(
        &'a self,
        job: &'a JobSpec,
        _conditional: &'a ConditionalValidators,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            let mut cmd = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(&job.location);
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c").arg(&job.location);
                c
            };
            for (name, value) in &job.headers {
                cmd.env(name, value);
            }
            capture_stdout(cmd, job.display_name()).await
        })
    }
}

/// Spawn `cmd`, collect its stdout and map a non-zero exit to a
/// [`FailureKind::Process`] failure.
///
/// The child is killed if the returned future is dropped, which is how the
/// executor's per-attempt timeout takes effect.
pub(crate) async fn capture_stdout(mut cmd: Command, label: &str) -> FetchResult {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        JobFailure::new(
            FailureKind::Process(None),
            format!("spawning process for '{label}': {e}"),
        )
    })?;

    if let Some(stderr) = child.stderr.take() {
        let label = label.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(job = %label, "stderr: {}", line);
            }
        });
    }

    let mut content = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout.read_to_end(&mut content).await.map_err(|e| {
            JobFailure::new(
                FailureKind::Process(None),
                format!("reading output of '{label}': {e}"),
            )
        })?;
    }

    let status = child.wait().await.map_err(|e| {
        JobFailure::new(
            FailureKind::Process(None),
            format!("waiting for process of '{label}': {e}"),
        )
    })?;

    info!(
        job = %label,
        exit_code = status.code().unwrap_or(-1),
        bytes = content.len(),
        "process exited"
    );

    if !status.success() {
        return Err(JobFailure::new(
            FailureKind::Process(status.code()),
            format!("'{label}' exited with {status}"),
        ));
    }

    Ok(Fetched::body(content))
}
