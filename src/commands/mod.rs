// src/commands/mod.rs

//! Subcommand implementations.
//!
//! Each command receives a [`Context`] (validated config plus the directory
//! relative store paths resolve against) and prints its human-facing output
//! to stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::CliArgs;
use crate::config::{ConfigFile, default_config_path, load_and_validate};
use crate::diff::{ChangeSelector, UnifiedDiffer};
use crate::engine::{Engine, WorkerLimits};
use crate::errors::{Result, SnapwatchError};
use crate::exec::JobExecutor;
use crate::fetch::{BrowserFetcher, CommandFetcher, FetcherSet, HttpFetcher};
use crate::job::{self, JobSpec};
use crate::store::{self, SnapshotStore};

pub mod inspect;
pub mod maintain;
pub mod run;

/// Everything a command needs from the invocation.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: ConfigFile,
    /// Directory of the config file.
    pub root: PathBuf,
    pub max_workers: Option<usize>,
}

impl Context {
    pub fn load(args: &CliArgs) -> Result<Self> {
        let config_path = args.config.clone().unwrap_or_else(default_config_path);
        let mut config = load_and_validate(&config_path).map_err(|e| match e {
            SnapwatchError::IoError(io) => SnapwatchError::ConfigError(format!(
                "reading {}: {io}",
                config_path.display()
            )),
            other => other,
        })?;
        if let Some(kind) = args.storage {
            config.storage.kind = kind;
        }
        Ok(Self {
            config,
            root: config_root_dir(&config_path),
            max_workers: args.max_workers,
        })
    }

    pub fn open_store(&self) -> Result<Arc<dyn SnapshotStore>> {
        store::open_store(&self.config.storage, &self.root)
    }

    pub fn lock_path(&self) -> Option<PathBuf> {
        store::lock_path(&self.config.storage, &self.root)
    }

    /// Resolve one job selector (index, key or name).
    pub fn job(&self, selector: &str) -> Result<&JobSpec> {
        job::select(&self.config.jobs, selector)
            .ok_or_else(|| SnapwatchError::JobNotFound(selector.to_string()))
    }

    /// Production engine: real fetchers, unified differ.
    pub fn engine(&self, store: Arc<dyn SnapshotStore>, audit: bool) -> Result<Engine> {
        let fetchers = FetcherSet::new(
            Arc::new(HttpFetcher::new()?),
            Arc::new(BrowserFetcher::new(&self.config.browser)),
            Arc::new(CommandFetcher::new()),
        );
        let selector = ChangeSelector::new(
            Arc::new(UnifiedDiffer),
            self.config.config.reference_selection,
            self.config.config.diff_context,
        );
        let limits = WorkerLimits::detect(&self.config.config, self.max_workers, audit);
        Ok(Engine::new(store, JobExecutor::new(fetchers), selector, limits))
    }
}

/// Directory relative store paths resolve against.
///
/// - If the config path has a non-empty parent (e.g. "conf/Snapwatch.toml"),
///   that directory.
/// - If it's a bare filename, the current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
