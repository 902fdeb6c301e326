// src/diff/selector.rs

//! Change selector: turns a [`RunOutcome`] plus retained history into a
//! [`DiffRecord`] and, for `new`/`changed` results, a snapshot to stage.
//!
//! Rules, in order:
//!
//! 1. A failed fetch is `error`, unless the job tolerates that failure, in
//!    which case it is `unchanged` (the previous state stands).
//! 2. "Not modified" is `unchanged` against the latest snapshot without
//!    looking at content. With no prior snapshot it is an `error`.
//! 3. No history: `new`.
//! 4. Byte-identical to any of the `compared_versions` newest snapshots:
//!    `unchanged` relative to the first (newest) match.
//! 5. Otherwise `changed`, diffed against the reference chosen by
//!    [`ReferenceSelection`]. If the differ reports no change after all
//!    and both sides are valid UTF-8, the result is downgraded to
//!    `unchanged` and nothing is staged. Undecodable content that differs
//!    byte-wise always stays `changed`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::diff::{DiffOptions, DiffPayload, Differ, line_distance};
use crate::exec::{FetchStatus, RunOutcome};
use crate::job::{JobKey, JobSpec};
use crate::store::{NewSnapshot, Snapshot, Validators};
use crate::types::ReferenceSelection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    New,
    Changed,
    Unchanged,
    Error,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::New => "new",
            Classification::Changed => "changed",
            Classification::Unchanged => "unchanged",
            Classification::Error => "error",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a retained snapshot in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

impl From<&Snapshot> for Reference {
    fn from(s: &Snapshot) -> Self {
        Self {
            sequence: s.sequence,
            captured_at: s.captured_at,
        }
    }
}

/// Per-job result of one run. Consumed by reporters, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DiffRecord {
    pub job_key: JobKey,
    pub name: String,
    pub classification: Classification,
    /// Snapshot the result is relative to (matched or diffed against).
    pub reference: Option<Reference>,
    /// Every retained state that took part in the comparison, newest first.
    pub compared: Vec<Reference>,
    pub payload: Option<DiffPayload>,
    pub error: Option<String>,
}

impl DiffRecord {
    fn new(job: &JobSpec, classification: Classification) -> Self {
        Self {
            job_key: job.key().to_string(),
            name: job.display_name().to_string(),
            classification,
            reference: None,
            compared: Vec::new(),
            payload: None,
            error: None,
        }
    }

    fn error(job: &JobSpec, message: impl Into<String>) -> Self {
        let mut record = Self::new(job, Classification::Error);
        record.error = Some(message.into());
        record
    }
}

/// Selector output: the record, and the snapshot to stage if any.
#[derive(Debug, Clone)]
pub struct Selection {
    pub record: DiffRecord,
    pub pending: Option<NewSnapshot>,
}

impl Selection {
    fn record_only(record: DiffRecord) -> Self {
        Self {
            record,
            pending: None,
        }
    }

    /// `error` result for a job that produced no outcome at all.
    pub fn failed(job: &JobSpec, message: impl Into<String>) -> Self {
        Self::record_only(DiffRecord::error(job, message))
    }
}

fn is_text(content: &[u8]) -> bool {
    std::str::from_utf8(content).is_ok()
}

#[derive(Clone)]
pub struct ChangeSelector {
    differ: Arc<dyn Differ>,
    reference_selection: ReferenceSelection,
    context: usize,
}

impl ChangeSelector {
    pub fn new(
        differ: Arc<dyn Differ>,
        reference_selection: ReferenceSelection,
        context: usize,
    ) -> Self {
        Self {
            differ,
            reference_selection,
            context,
        }
    }

    /// Classify `outcome` against `history` (newest first, at most
    /// `compared_versions` entries are considered).
    pub fn select(&self, job: &JobSpec, outcome: RunOutcome, history: &[Snapshot]) -> Selection {
        let window = &history[..history.len().min(job.compared_versions.max(1))];

        let record = match outcome.status {
            FetchStatus::Failed(failure) => {
                if failure.is_tolerated_by(&job.tolerance) {
                    info!(job = %job.display_name(), error = %failure, "ignoring tolerated error");
                    let mut record = DiffRecord::new(job, Classification::Unchanged);
                    record.reference = window.first().map(Reference::from);
                    record
                } else {
                    DiffRecord::error(job, failure.to_string())
                }
            }
            FetchStatus::NotModified => match window.first() {
                Some(latest) => {
                    let mut record = DiffRecord::new(job, Classification::Unchanged);
                    record.reference = Some(Reference::from(latest));
                    record
                }
                None => DiffRecord::error(
                    job,
                    "server answered 'not modified' but no snapshot exists",
                ),
            },
            FetchStatus::Fetched => {
                return self.select_content(
                    job,
                    outcome.content,
                    outcome.content_type,
                    outcome.validators,
                    window,
                );
            }
        };
        Selection::record_only(record)
    }

    fn select_content(
        &self,
        job: &JobSpec,
        content: Vec<u8>,
        content_type: Option<String>,
        validators: Validators,
        window: &[Snapshot],
    ) -> Selection {
        let pending = NewSnapshot {
            captured_at: Utc::now(),
            content,
            validators,
            content_type,
        };

        if window.is_empty() {
            return Selection {
                record: DiffRecord::new(job, Classification::New),
                pending: Some(pending),
            };
        }

        let compared: Vec<Reference> = window.iter().map(Reference::from).collect();

        if let Some(matched) = window.iter().find(|s| s.content == pending.content) {
            debug!(
                job = %job.display_name(),
                sequence = matched.sequence,
                "content matches a retained snapshot"
            );
            let mut record = DiffRecord::new(job, Classification::Unchanged);
            record.reference = Some(Reference::from(matched));
            record.compared = compared;
            return Selection::record_only(record);
        }

        let reference = self.pick_reference(window, &pending.content);
        let options = DiffOptions {
            context: self.context,
            old_label: format!("{} @ {}", job.key(), reference.captured_at.to_rfc3339()),
            new_label: format!("{} @ {}", job.key(), pending.captured_at.to_rfc3339()),
        };

        let mut record = match self.differ.compare(&reference.content, &pending.content, &options) {
            Ok(payload)
                if !payload.changed && is_text(&reference.content) && is_text(&pending.content) =>
            {
                debug!(job = %job.display_name(), "differ reports no change");
                let mut record = DiffRecord::new(job, Classification::Unchanged);
                record.reference = Some(Reference::from(reference));
                record.compared = compared;
                return Selection::record_only(record);
            }
            Ok(mut payload) => {
                payload.changed = true;
                let mut record = DiffRecord::new(job, Classification::Changed);
                record.payload = Some(payload);
                record
            }
            Err(message) => return Selection::record_only(DiffRecord::error(job, message)),
        };
        record.reference = Some(Reference::from(reference));
        record.compared = compared;

        Selection {
            record,
            pending: Some(pending),
        }
    }

    /// Reference to diff against. `closest` picks the smallest line
    /// distance; ties go to the more recent snapshot.
    fn pick_reference<'h>(&self, window: &'h [Snapshot], content: &[u8]) -> &'h Snapshot {
        let latest = &window[0];
        if self.reference_selection == ReferenceSelection::Latest || window.len() == 1 {
            return latest;
        }

        let mut best = latest;
        let mut best_distance = line_distance(&latest.content, content);
        for candidate in &window[1..] {
            let distance = line_distance(&candidate.content, content);
            if distance < best_distance {
                best = candidate;
                best_distance = distance;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::UnifiedDiffer;
    use crate::fetch::{FailureKind, JobFailure};
    use crate::filter::FilterPipeline;
    use crate::job::{ErrorTolerance, JobKind};
    use chrono::Duration as ChronoDuration;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn job(compared_versions: usize) -> JobSpec {
        JobSpec {
            index: 1,
            name: Some("A".into()),
            kind: JobKind::Url,
            location: "https://a.example/".into(),
            headers: BTreeMap::new(),
            max_tries: 1,
            timeout: None,
            compared_versions,
            max_snapshots: None,
            conditional: true,
            tolerance: ErrorTolerance::default(),
            filters: FilterPipeline::new(),
            enabled: true,
        }
    }

    fn outcome(status: FetchStatus, content: &[u8]) -> RunOutcome {
        RunOutcome {
            job_key: "https://a.example/".into(),
            content: content.to_vec(),
            content_type: None,
            validators: Validators::default(),
            status,
            elapsed: Duration::ZERO,
            tries: 1,
        }
    }

    /// Newest first.
    fn history(contents: &[&str]) -> Vec<Snapshot> {
        let now = Utc::now();
        let n = contents.len() as u64;
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| Snapshot {
                job_key: "https://a.example/".into(),
                sequence: n - i as u64,
                captured_at: now - ChronoDuration::minutes(i as i64),
                content: c.as_bytes().to_vec(),
                validators: Validators::default(),
                content_type: None,
            })
            .collect()
    }

    fn selector(mode: ReferenceSelection) -> ChangeSelector {
        ChangeSelector::new(Arc::new(UnifiedDiffer), mode, 3)
    }

    #[test]
    fn first_observation_is_new() {
        let s = selector(ReferenceSelection::Closest).select(&job(1), outcome(FetchStatus::Fetched, b"foo"), &[]);
        assert_eq!(s.record.classification, Classification::New);
        assert_eq!(s.pending.unwrap().content, b"foo");
    }

    #[test]
    fn identical_content_is_unchanged() {
        let h = history(&["foo"]);
        let s = selector(ReferenceSelection::Closest).select(&job(1), outcome(FetchStatus::Fetched, b"foo"), &h);
        assert_eq!(s.record.classification, Classification::Unchanged);
        assert!(s.pending.is_none());
    }

    #[test]
    fn older_match_only_counts_within_compared_versions() {
        let h = history(&["B", "A"]);

        let s = selector(ReferenceSelection::Closest).select(&job(2), outcome(FetchStatus::Fetched, b"A"), &h);
        assert_eq!(s.record.classification, Classification::Unchanged);
        assert_eq!(s.record.reference.map(|r| r.sequence), Some(1));
        assert!(s.pending.is_none());

        let s = selector(ReferenceSelection::Closest).select(&job(1), outcome(FetchStatus::Fetched, b"A"), &h);
        assert_eq!(s.record.classification, Classification::Changed);
        assert!(s.pending.is_some());
    }

    #[test]
    fn closest_reference_wins_over_latest() {
        let h = history(&["x\ny\nz\n", "a\nb\nc\nd\n"]);
        let new = b"a\nb\nc\nE\n";

        let s = selector(ReferenceSelection::Closest).select(&job(2), outcome(FetchStatus::Fetched, new), &h);
        assert_eq!(s.record.classification, Classification::Changed);
        assert_eq!(s.record.reference.map(|r| r.sequence), Some(1));
        assert_eq!(s.record.compared.len(), 2);

        let s = selector(ReferenceSelection::Latest).select(&job(2), outcome(FetchStatus::Fetched, new), &h);
        assert_eq!(s.record.reference.map(|r| r.sequence), Some(2));
    }

    #[test]
    fn equal_distance_prefers_recent() {
        let h = history(&["a\n", "b\n"]);
        let s = selector(ReferenceSelection::Closest).select(&job(2), outcome(FetchStatus::Fetched, b"c\n"), &h);
        assert_eq!(s.record.reference.map(|r| r.sequence), Some(2));
    }

    #[test]
    fn failures_and_tolerance() {
        let h = history(&["foo"]);
        let failed = || {
            outcome(
                FetchStatus::Failed(JobFailure::new(FailureKind::HttpStatus(404), "Not Found")),
                b"",
            )
        };

        let s = selector(ReferenceSelection::Closest).select(&job(1), failed(), &h);
        assert_eq!(s.record.classification, Classification::Error);
        assert!(s.record.error.as_deref().unwrap().contains("404"));

        let mut tolerant = job(1);
        tolerant.tolerance.http_status = vec![crate::job::StatusMatcher::Exact(404)];
        let s = selector(ReferenceSelection::Closest).select(&tolerant, failed(), &h);
        assert_eq!(s.record.classification, Classification::Unchanged);
        assert!(s.pending.is_none());
    }

    /// Differ that treats every pair of states as equivalent.
    struct Lenient;

    impl Differ for Lenient {
        fn compare(&self, _old: &[u8], _new: &[u8], _options: &DiffOptions) -> Result<DiffPayload, String> {
            Ok(DiffPayload {
                text: String::new(),
                changed: false,
            })
        }
    }

    fn binary_history(content: &[u8]) -> Vec<Snapshot> {
        vec![Snapshot {
            job_key: "https://a.example/".into(),
            sequence: 1,
            captured_at: Utc::now(),
            content: content.to_vec(),
            validators: Validators::default(),
            content_type: None,
        }]
    }

    #[test]
    fn undecodable_content_that_differs_is_changed() {
        let h = binary_history(&[0xff, b'\n']);
        let s = selector(ReferenceSelection::Closest).select(&job(1), outcome(FetchStatus::Fetched, &[0xfe, b'\n']), &h);
        assert_eq!(s.record.classification, Classification::Changed);
        assert_eq!(s.pending.unwrap().content, vec![0xfe, b'\n']);
    }

    #[test]
    fn differ_verdict_only_downgrades_text() {
        let lenient = ChangeSelector::new(Arc::new(Lenient), ReferenceSelection::Latest, 3);

        let h = history(&["a  b\n"]);
        let s = lenient.select(&job(1), outcome(FetchStatus::Fetched, b"a b\n"), &h);
        assert_eq!(s.record.classification, Classification::Unchanged);
        assert!(s.pending.is_none());

        let h = binary_history(&[0xff, 0x00]);
        let s = lenient.select(&job(1), outcome(FetchStatus::Fetched, &[0xfe, 0x00]), &h);
        assert_eq!(s.record.classification, Classification::Changed);
        assert!(s.record.payload.unwrap().changed);
        assert!(s.pending.is_some());
    }

    #[test]
    fn not_modified_needs_history() {
        let s = selector(ReferenceSelection::Closest).select(&job(1), outcome(FetchStatus::NotModified, b""), &[]);
        assert_eq!(s.record.classification, Classification::Error);

        let h = history(&["foo"]);
        let s = selector(ReferenceSelection::Closest).select(&job(1), outcome(FetchStatus::NotModified, b""), &h);
        assert_eq!(s.record.classification, Classification::Unchanged);
        assert!(s.pending.is_none());
    }
}
