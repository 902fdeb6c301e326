// src/report/json.rs

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::diff::DiffRecord;
use crate::errors::Result;

use super::{Counts, Reporter};

/// Writes the run as a JSON document to a file, replacing it each run.
#[derive(Debug, Clone)]
pub struct JsonReporter {
    path: PathBuf,
}

#[derive(Serialize)]
struct Document<'a> {
    generated_at: DateTime<Utc>,
    summary: Summary,
    records: &'a [DiffRecord],
}

#[derive(Serialize)]
struct Summary {
    new: usize,
    changed: usize,
    unchanged: usize,
    error: usize,
}

impl JsonReporter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Reporter for JsonReporter {
    fn name(&self) -> &str {
        "json"
    }

    fn send(&self, records: &[DiffRecord]) -> Result<()> {
        let counts = Counts::of(records);
        let doc = Document {
            generated_at: Utc::now(),
            summary: Summary {
                new: counts.new,
                changed: counts.changed,
                unchanged: counts.unchanged,
                error: counts.error,
            },
            records,
        };
        let json = serde_json::to_string_pretty(&doc)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Classification;

    #[test]
    fn writes_records_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.json");
        let record = DiffRecord {
            job_key: "echo hi".into(),
            name: "hi".into(),
            classification: Classification::New,
            reference: None,
            compared: Vec::new(),
            payload: None,
            error: None,
        };

        JsonReporter::new(path.clone()).send(&[record]).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["new"], 1);
        assert_eq!(value["records"][0]["classification"], "new");
        assert_eq!(value["records"][0]["job_key"], "echo hi");
    }
}
