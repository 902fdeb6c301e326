// src/config/mod.rs

//! Configuration loading and validation for snapwatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it and turn `[[job]]` tables into immutable `JobSpec`s
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    BrowserConfig, ConfigFile, ConfigSection, HttpCode, JobConfig, RawConfigFile, ReporterConfig,
    StorageConfig,
};
