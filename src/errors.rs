// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! Job-level failures (fetch, filter, differ) are carried inside a
//! `RunOutcome` as a [`JobFailure`](crate::fetch::JobFailure) so that one job
//! never aborts its siblings. The variants below are what escapes to the
//! caller: store failures abort the whole run, capability errors fail fast.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapwatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Network or timeout failure talking to a source.
    #[error("transient fetch error for '{key}': {message}")]
    TransientFetch { key: String, message: String },

    /// Filter or differ failure.
    #[error("content error for '{key}': {message}")]
    Content { key: String, message: String },

    /// The active backend does not support the requested operation.
    #[error("storage backend '{backend}' does not support {operation}")]
    StoreCapability {
        backend: &'static str,
        operation: &'static str,
    },

    /// The backend is unavailable or its data is corrupt.
    #[error("storage error: {0}")]
    StoreIo(String),

    #[error("reporter '{reporter}' failed: {message}")]
    Reporting { reporter: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SnapwatchError {
    pub fn store_io(context: &str, err: impl std::fmt::Display) -> Self {
        SnapwatchError::StoreIo(format!("{context}: {err}"))
    }

    pub fn unsupported(backend: &'static str, operation: &'static str) -> Self {
        SnapwatchError::StoreCapability { backend, operation }
    }
}

impl From<rusqlite::Error> for SnapwatchError {
    fn from(err: rusqlite::Error) -> Self {
        SnapwatchError::store_io("sqlite", err)
    }
}

impl From<redis::RedisError> for SnapwatchError {
    fn from(err: redis::RedisError) -> Self {
        SnapwatchError::store_io("redis", err)
    }
}

impl From<serde_json::Error> for SnapwatchError {
    fn from(err: serde_json::Error) -> Self {
        SnapwatchError::store_io("serialization", err)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SnapwatchError>;
