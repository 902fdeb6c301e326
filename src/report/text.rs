// src/report/text.rs

//! Plain-text report, grouped by category.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Mutex;

use crate::diff::{Classification, DiffRecord};
use crate::errors::Result;

use super::{Counts, Reporter};

pub struct TextReporter {
    out: Mutex<Box<dyn Write + Send>>,
    show_unchanged: bool,
}

impl TextReporter {
    pub fn stdout(show_unchanged: bool) -> Self {
        Self::to_writer(Box::new(io::stdout()), show_unchanged)
    }

    pub fn to_writer(out: Box<dyn Write + Send>, show_unchanged: bool) -> Self {
        Self {
            out: Mutex::new(out),
            show_unchanged,
        }
    }
}

impl Reporter for TextReporter {
    fn name(&self) -> &str {
        "stdout"
    }

    fn send(&self, records: &[DiffRecord]) -> Result<()> {
        let text = render(records, self.show_unchanged);
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::other("report writer poisoned"))?;
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Render a report: errors first, then new, changed and (optionally)
/// unchanged jobs, then a summary line.
pub fn render(records: &[DiffRecord], show_unchanged: bool) -> String {
    let mut text = String::new();

    let sections = [
        (Classification::Error, "ERRORS"),
        (Classification::New, "NEW"),
        (Classification::Changed, "CHANGED"),
        (Classification::Unchanged, "UNCHANGED"),
    ];

    for (class, title) in sections {
        if class == Classification::Unchanged && !show_unchanged {
            continue;
        }
        let group: Vec<&DiffRecord> = records
            .iter()
            .filter(|r| r.classification == class)
            .collect();
        if group.is_empty() {
            continue;
        }

        let _ = writeln!(text, "{title} ({})", group.len());
        for record in group {
            let _ = writeln!(text, "  {}: {}", record.classification, record.name);
            if let Some(error) = &record.error {
                let _ = writeln!(text, "    {error}");
            }
            if let Some(payload) = &record.payload {
                for line in payload.text.lines() {
                    let _ = writeln!(text, "    {line}");
                }
            }
        }
        text.push('\n');
    }

    let counts = Counts::of(records);
    let _ = writeln!(
        text,
        "{} new, {} changed, {} unchanged, {} error",
        counts.new, counts.changed, counts.unchanged, counts.error
    );
    text
}
