// src/fetch/conditional.rs

//! Conditional retrieval coordinator.
//!
//! Before a network fetch, the latest snapshot's validators become
//! `If-None-Match` / `If-Modified-Since` headers. The server alone decides
//! whether its entity matches (weak comparison); we only echo back what it
//! gave us last time. A "not modified" answer means the latest snapshot is
//! still the current state: nothing is diffed and nothing is written.

use chrono::{DateTime, Utc};

use crate::job::JobSpec;
use crate::store::Snapshot;

/// Headers to attach to an outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalValidators {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
}

impl ConditionalValidators {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.if_none_match.is_none() && self.if_modified_since.is_none()
    }
}

/// Format a timestamp as an HTTP-date (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Validators for `job` given its latest snapshot.
///
/// Jobs without history, non-network jobs and jobs with `conditional =
/// false` fetch unconditionally. When the server never sent
/// `Last-Modified`, the capture time of the latest snapshot stands in.
pub fn validators_for(job: &JobSpec, latest: Option<&Snapshot>) -> ConditionalValidators {
    let Some(latest) = latest else {
        return ConditionalValidators::none();
    };
    if !job.uses_conditional_fetch() {
        return ConditionalValidators::none();
    }

    ConditionalValidators {
        if_none_match: latest.validators.etag.clone(),
        if_modified_since: Some(
            latest
                .validators
                .last_modified
                .clone()
                .unwrap_or_else(|| http_date(latest.captured_at)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterPipeline;
    use crate::job::{ErrorTolerance, JobKind};
    use crate::store::Validators;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn job(kind: JobKind, conditional: bool) -> JobSpec {
        JobSpec {
            index: 1,
            name: None,
            kind,
            location: "https://example.org/".into(),
            headers: BTreeMap::new(),
            max_tries: 1,
            timeout: None,
            compared_versions: 1,
            max_snapshots: None,
            conditional,
            tolerance: ErrorTolerance::default(),
            filters: FilterPipeline::new(),
            enabled: true,
        }
    }

    fn snapshot(validators: Validators) -> Snapshot {
        Snapshot {
            job_key: "https://example.org/".into(),
            sequence: 1,
            captured_at: Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap(),
            content: b"x".to_vec(),
            validators,
            content_type: None,
        }
    }

    #[test]
    fn forwards_previous_validators() {
        let latest = snapshot(Validators {
            etag: Some("W/\"abc\"".into()),
            last_modified: Some("Tue, 01 Jan 2030 00:00:00 GMT".into()),
        });
        let v = validators_for(&job(JobKind::Url, true), Some(&latest));
        assert_eq!(v.if_none_match.as_deref(), Some("W/\"abc\""));
        assert_eq!(v.if_modified_since.as_deref(), Some("Tue, 01 Jan 2030 00:00:00 GMT"));
    }

    #[test]
    fn falls_back_to_capture_time() {
        let latest = snapshot(Validators::default());
        let v = validators_for(&job(JobKind::Url, true), Some(&latest));
        assert_eq!(v.if_none_match, None);
        assert_eq!(v.if_modified_since.as_deref(), Some("Sun, 06 Nov 1994 08:49:37 GMT"));
    }

    #[test]
    fn unconditional_without_history_or_when_disabled() {
        let latest = snapshot(Validators::default());
        assert!(validators_for(&job(JobKind::Url, true), None).is_empty());
        assert!(validators_for(&job(JobKind::Url, false), Some(&latest)).is_empty());
        assert!(validators_for(&job(JobKind::Browser, true), Some(&latest)).is_empty());
        assert!(validators_for(&job(JobKind::Command, true), Some(&latest)).is_empty());
    }
}
