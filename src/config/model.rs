// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::job::JobSpec;
use crate::types::{ReferenceSelection, ReporterKind, StorageKind};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// max_workers = 8
///
/// [storage]
/// kind = "sqlite"
/// max_snapshots = 4
///
/// [[reporter]]
/// kind = "stdout"
///
/// [[job]]
/// name = "Release notes"
/// url = "https://example.org/releases"
/// filters = ["strip"]
///
/// [[job]]
/// command = "ls -l /var/spool"
/// ```
///
/// Every section except `[[job]]` is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub reporter: Vec<ReporterConfig>,

    #[serde(default)]
    pub job: Vec<JobConfig>,
}

/// Validated configuration. Only constructible through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub storage: StorageConfig,
    pub browser: BrowserConfig,
    pub reporters: Vec<ReporterConfig>,
    /// Job set for this invocation, in file order.
    pub jobs: Vec<JobSpec>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        storage: StorageConfig,
        browser: BrowserConfig,
        reporters: Vec<ReporterConfig>,
        jobs: Vec<JobSpec>,
    ) -> Self {
        Self {
            config,
            storage,
            browser,
            reporters,
            jobs,
        }
    }
}

/// `[config]` section: scheduling and diff behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Global cap applied to both scheduling phases.
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// K in `min(light_max_workers, cpus * K)`.
    #[serde(default = "default_light_workers_per_cpu")]
    pub light_workers_per_cpu: usize,

    #[serde(default = "default_light_max_workers")]
    pub light_max_workers: usize,

    /// Memory budget of one rendering-engine instance.
    #[serde(default = "default_heavy_instance_memory_mb")]
    pub heavy_instance_memory_mb: u64,

    /// Per-job timeout when the job does not set one. 0 = unbounded.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Context lines in unified diffs.
    #[serde(default = "default_diff_context")]
    pub diff_context: usize,

    #[serde(default)]
    pub reference_selection: ReferenceSelection,
}

fn default_light_workers_per_cpu() -> usize {
    5
}

fn default_light_max_workers() -> usize {
    64
}

fn default_heavy_instance_memory_mb() -> u64 {
    512
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_diff_context() -> usize {
    3
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_workers: None,
            light_workers_per_cpu: default_light_workers_per_cpu(),
            light_max_workers: default_light_max_workers(),
            heavy_instance_memory_mb: default_heavy_instance_memory_mb(),
            default_timeout_secs: default_timeout_secs(),
            diff_context: default_diff_context(),
            reference_selection: ReferenceSelection::default(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub kind: StorageKind,

    /// Database file (sqlite) or directory (files, legacy). Relative to the
    /// config file's directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Server URL for the redis engine.
    #[serde(default)]
    pub url: Option<String>,

    /// Snapshots kept per key on append; 0 = unbounded.
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,
}

fn default_max_snapshots() -> usize {
    4
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            path: None,
            url: None,
            max_snapshots: default_max_snapshots(),
        }
    }
}

/// `[browser]` section: the external rendering engine used by
/// `browser = true` jobs. The URL is appended as the last argument and the
/// rendered document is read from stdout.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserConfig {
    #[serde(default = "default_browser_command")]
    pub command: String,

    #[serde(default = "default_browser_args")]
    pub args: Vec<String>,
}

fn default_browser_command() -> String {
    "chromium".to_string()
}

fn default_browser_args() -> Vec<String> {
    vec!["--headless".to_string(), "--dump-dom".to_string()]
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            command: default_browser_command(),
            args: default_browser_args(),
        }
    }
}

/// `[[reporter]]` entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReporterConfig {
    pub kind: ReporterKind,

    /// Output file for the json reporter.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// A failure of a fatal reporter discards the whole run.
    #[serde(default)]
    pub fatal: bool,

    #[serde(default)]
    pub show_unchanged: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// `ignore_http_error_codes` accepts both `404` and `"4xx"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HttpCode {
    Code(u16),
    Text(String),
}

/// `[[job]]` entries, exactly as written in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub command: Option<String>,

    /// Render `url` through the external browser engine.
    #[serde(default)]
    pub browser: bool,

    #[serde(default)]
    pub max_tries: Option<u32>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub compared_versions: Option<usize>,

    /// Retention override for this job's key.
    #[serde(default)]
    pub max_snapshots: Option<usize>,

    /// Send validators from the previous snapshot (default true).
    #[serde(default)]
    pub conditional: Option<bool>,

    #[serde(default)]
    pub ignore_connection_errors: bool,

    #[serde(default)]
    pub ignore_timeout_errors: bool,

    #[serde(default)]
    pub ignore_too_many_redirects: bool,

    #[serde(default)]
    pub ignore_http_error_codes: Vec<HttpCode>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub filters: Vec<String>,

    #[serde(default)]
    pub enabled: Option<bool>,
}
