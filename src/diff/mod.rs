// src/diff/mod.rs

//! Change detection.
//!
//! - [`Differ`] renders a comparison between two content states. The
//!   in-crate [`UnifiedDiffer`] produces line-based unified diffs.
//! - [`selector`] owns classification (`new` / `changed` / `unchanged` /
//!   `error`) and the choice of reference snapshot.

use serde::Serialize;
use similar::{ChangeTag, TextDiff};

pub mod selector;

pub use selector::{ChangeSelector, Classification, DiffRecord, Reference, Selection};

/// Knobs the core passes to a differ.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub context: usize,
    pub old_label: String,
    pub new_label: String,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context: 3,
            old_label: "old".to_string(),
            new_label: "new".to_string(),
        }
    }
}

/// Opaque comparison artifact plus the differ's own verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffPayload {
    pub text: String,
    /// `false` means the differ considers both states equivalent.
    pub changed: bool,
}

pub trait Differ: Send + Sync {
    fn compare(&self, old: &[u8], new: &[u8], options: &DiffOptions) -> Result<DiffPayload, String>;
}

/// Line-based unified diff.
#[derive(Debug, Default, Clone)]
pub struct UnifiedDiffer;

impl Differ for UnifiedDiffer {
    fn compare(&self, old: &[u8], new: &[u8], options: &DiffOptions) -> Result<DiffPayload, String> {
        let old_text = String::from_utf8_lossy(old);
        let new_text = String::from_utf8_lossy(new);
        let diff = TextDiff::from_lines(old_text.as_ref(), new_text.as_ref());
        let changed = diff
            .iter_all_changes()
            .any(|change| change.tag() != ChangeTag::Equal);

        // Distinct invalid sequences decode to the same replacement text.
        if !changed && old != new {
            return Ok(DiffPayload {
                text: format!(
                    "Binary content {} and {} differ ({} -> {} bytes)\n",
                    options.old_label,
                    options.new_label,
                    old.len(),
                    new.len()
                ),
                changed: true,
            });
        }

        let text = diff
            .unified_diff()
            .context_radius(options.context)
            .header(&options.old_label, &options.new_label)
            .to_string();
        Ok(DiffPayload { text, changed })
    }
}

/// Number of inserted plus deleted lines between two states.
///
/// Used to pick the closest retained snapshot as diff reference.
pub fn line_distance(a: &[u8], b: &[u8]) -> usize {
    let a = String::from_utf8_lossy(a);
    let b = String::from_utf8_lossy(b);
    TextDiff::from_lines(a.as_ref(), b.as_ref())
        .iter_all_changes()
        .filter(|change| change.tag() != ChangeTag::Equal)
        .count()
}
