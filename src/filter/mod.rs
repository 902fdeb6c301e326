// src/filter/mod.rs

//! Content filter pipeline.
//!
//! Filters are pure byte transformations applied to fetched content before
//! change detection. Only a handful of line-oriented built-ins live here;
//! richer extraction (HTML, PDF, images) plugs in through [`Filter`].

use std::fmt::Debug;
use std::sync::Arc;

use regex::bytes::Regex;

/// A single stateless content transformation.
pub trait Filter: Send + Sync + Debug {
    fn transform(&self, data: &[u8], content_type: Option<&str>) -> Result<Vec<u8>, String>;
}

/// Ordered chain of filters, built from spec strings such as `"strip"` or
/// `"grep:^Price"`.
#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of filter specs. Fails on the first unknown or malformed
    /// spec.
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self, String> {
        let mut pipeline = Self::new();
        for spec in specs {
            pipeline.filters.push(parse_spec(spec.as_ref())?);
        }
        Ok(pipeline)
    }

    pub fn push(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn apply(&self, data: Vec<u8>, content_type: Option<&str>) -> Result<Vec<u8>, String> {
        let mut current = data;
        for filter in &self.filters {
            current = filter.transform(&current, content_type)?;
        }
        Ok(current)
    }
}

fn parse_spec(spec: &str) -> Result<Arc<dyn Filter>, String> {
    let (name, arg) = match spec.split_once(':') {
        Some((name, arg)) => (name.trim(), Some(arg)),
        None => (spec.trim(), None),
    };

    match (name, arg) {
        ("strip", None) => Ok(Arc::new(Strip)),
        ("sort", None) => Ok(Arc::new(SortLines)),
        ("utf8", None) => Ok(Arc::new(RequireUtf8)),
        ("grep", Some(pattern)) => Ok(Arc::new(Grep::new(pattern, true)?)),
        ("grepi", Some(pattern)) => Ok(Arc::new(Grep::new(pattern, false)?)),
        ("grep" | "grepi", None) => Err(format!("filter '{name}' needs a pattern (e.g. {name}:foo)")),
        (other, _) => Err(format!("unknown filter '{other}'")),
    }
}

/// Trim trailing whitespace on every line and surrounding blank space.
#[derive(Debug)]
struct Strip;

impl Filter for Strip {
    fn transform(&self, data: &[u8], _content_type: Option<&str>) -> Result<Vec<u8>, String> {
        let lines: Vec<&[u8]> = data
            .split(|b| *b == b'\n')
            .map(|line| line.trim_ascii_end())
            .collect();
        let joined = lines.join(&b'\n');
        Ok(joined.trim_ascii().to_vec())
    }
}

#[derive(Debug)]
struct SortLines;

impl Filter for SortLines {
    fn transform(&self, data: &[u8], _content_type: Option<&str>) -> Result<Vec<u8>, String> {
        let mut lines: Vec<&[u8]> = data.split(|b| *b == b'\n').collect();
        lines.sort();
        Ok(lines.join(&b'\n'))
    }
}

#[derive(Debug)]
struct RequireUtf8;

impl Filter for RequireUtf8 {
    fn transform(&self, data: &[u8], _content_type: Option<&str>) -> Result<Vec<u8>, String> {
        std::str::from_utf8(data)
            .map(|s| s.as_bytes().to_vec())
            .map_err(|e| format!("content is not valid UTF-8: {e}"))
    }
}

/// Keep (`keep = true`) or drop lines matching a regex.
#[derive(Debug)]
struct Grep {
    pattern: Regex,
    keep: bool,
}

impl Grep {
    fn new(pattern: &str, keep: bool) -> Result<Self, String> {
        let pattern = Regex::new(pattern).map_err(|e| format!("invalid grep pattern: {e}"))?;
        Ok(Self { pattern, keep })
    }
}

impl Filter for Grep {
    fn transform(&self, data: &[u8], _content_type: Option<&str>) -> Result<Vec<u8>, String> {
        let lines: Vec<&[u8]> = data
            .split(|b| *b == b'\n')
            .filter(|line| self.pattern.is_match(line) == self.keep)
            .collect();
        Ok(lines.join(&b'\n'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_applies_filters_in_order() {
        let pipeline = FilterPipeline::from_specs(&["grepi:^#", "strip", "sort"]).unwrap();
        let out = pipeline
            .apply(b"  \n# comment\nzeta  \nalpha\n\n".to_vec(), None)
            .unwrap();
        assert_eq!(out, b"alpha\nzeta".to_vec());
    }

    #[test]
    fn unknown_or_incomplete_specs_are_rejected() {
        assert!(FilterPipeline::from_specs(&["html2text"]).is_err());
        assert!(FilterPipeline::from_specs(&["grep"]).is_err());
        assert!(FilterPipeline::from_specs(&["grep:("]).is_err());
    }

    #[test]
    fn utf8_filter_reports_invalid_bytes() {
        let pipeline = FilterPipeline::from_specs(&["utf8"]).unwrap();
        assert!(pipeline.apply(vec![0xff, 0xfe], None).is_err());
    }
}
