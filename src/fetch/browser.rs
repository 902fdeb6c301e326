// src/fetch/browser.rs

//! Heavy jobs: render a URL through an external engine.
//!
//! The engine is any program that takes the URL as its last argument and
//! prints the rendered document to stdout (`chromium --headless --dump-dom`
//! by default). Instances are memory hungry, which is why the scheduler
//! runs these jobs in a separate, smaller phase.

use tokio::process::Command;
use tracing::debug;

use crate::config::BrowserConfig;
use crate::job::JobSpec;

use super::command::capture_stdout;
use super::{ConditionalValidators, FetchFuture, Fetcher};

#[derive(Debug, Clone)]
pub struct BrowserFetcher {
    program: String,
    args: Vec<String>,
}

impl BrowserFetcher {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

impl Fetcher for BrowserFetcher {
    fn fetch<'a>(
        &'a self,
        job: &'a JobSpec,
        _conditional: &'a ConditionalValidators,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            debug!(job = %job.display_name(), engine = %self.program, "rendering");
            let mut cmd = Command::new(&self.program);
            cmd.args(&self.args).arg(&job.location);
            let mut fetched = capture_stdout(cmd, job.display_name()).await?;
            fetched.content_type = Some("text/html".to_string());
            Ok(fetched)
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::filter::FilterPipeline;
    use crate::job::{ErrorTolerance, JobKind};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn url_is_passed_as_last_argument() {
        let engine = BrowserFetcher::new(&BrowserConfig {
            command: "echo".into(),
            args: vec!["rendered".into()],
        });
        let job = JobSpec {
            index: 1,
            name: None,
            kind: JobKind::Browser,
            location: "https://example.org/".into(),
            headers: BTreeMap::new(),
            max_tries: 1,
            timeout: None,
            compared_versions: 1,
            max_snapshots: None,
            conditional: true,
            tolerance: ErrorTolerance::default(),
            filters: FilterPipeline::new(),
            enabled: true,
        };
        let fetched = engine
            .fetch(&job, &ConditionalValidators::none())
            .await
            .unwrap();
        assert_eq!(fetched.content, b"rendered https://example.org/\n");
        assert_eq!(fetched.content_type.as_deref(), Some("text/html"));
    }
}
