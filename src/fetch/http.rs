// src/fetch/http.rs

//! Plain network fetches via `reqwest`.

use std::time::Duration;

use reqwest::header::{
    CONTENT_TYPE, ETAG, HeaderMap, HeaderName, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    LAST_MODIFIED,
};
use reqwest::{StatusCode, redirect};
use tracing::debug;

use crate::errors::{Result, SnapwatchError};
use crate::job::JobSpec;
use crate::store::Validators;

use super::{
    ConditionalValidators, FailureKind, FetchFuture, FetchResult, Fetched, Fetcher, JobFailure,
};

/// Redirect hops followed before giving up with `TooManyRedirects`.
const MAX_REDIRECTS: usize = 10;

const USER_AGENT: &str = concat!("snapwatch/", env!("CARGO_PKG_VERSION"));

/// Fetches `JobKind::Url` jobs. One client (and connection pool) is shared
/// by every job of a run.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| SnapwatchError::ConfigError(format!("building HTTP client: {e}")))?;
        Ok(Self { http })
    }

    async fn get(&self, job: &JobSpec, conditional: &ConditionalValidators) -> FetchResult {
        let mut headers = HeaderMap::new();
        for (name, value) in &job.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                JobFailure::content(format!("invalid header name '{name}': {e}"))
            })?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| JobFailure::content(format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }
        if let Some(etag) = conditional.if_none_match.as_deref() {
            if let Ok(value) = HeaderValue::from_str(etag) {
                headers.insert(IF_NONE_MATCH, value);
            }
        }
        if let Some(since) = conditional.if_modified_since.as_deref() {
            if let Ok(value) = HeaderValue::from_str(since) {
                headers.insert(IF_MODIFIED_SINCE, value);
            }
        }

        let mut request = self.http.get(&job.location).headers(headers);
        if let Some(timeout) = job.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| classify(e, job.timeout))?;
        let status = response.status();
        debug!(job = %job.display_name(), %status, "response received");

        if status == StatusCode::NOT_MODIFIED {
            return Ok(Fetched::not_modified());
        }
        if status.is_client_error() || status.is_server_error() {
            return Err(JobFailure::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.canonical_reason().unwrap_or("error").to_string(),
            ));
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let validators = Validators {
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
        };
        let content_type = header(CONTENT_TYPE);

        let body = response.bytes().await.map_err(|e| classify(e, job.timeout))?;

        Ok(Fetched {
            content: body.to_vec(),
            content_type,
            validators,
            not_modified: false,
        })
    }
}

fn classify(err: reqwest::Error, timeout: Option<Duration>) -> JobFailure {
    if err.is_timeout() {
        return match timeout {
            Some(after) => JobFailure::timeout(after),
            None => JobFailure::new(FailureKind::Timeout, err.to_string()),
        };
    }
    if err.is_redirect() {
        return JobFailure::new(FailureKind::TooManyRedirects, err.to_string());
    }
    JobFailure::new(FailureKind::Connection, err.to_string())
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        job: &'a JobSpec,
        conditional: &'a ConditionalValidators,
    ) -> FetchFuture<'a> {
        Box::pin(self.get(job, conditional))
    }
}
