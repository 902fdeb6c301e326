// src/types.rs

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which snapshot store engine to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Indexed, compressed SQLite database (default).
    #[default]
    Sqlite,
    /// One file per job key, latest snapshot only.
    Files,
    /// Remote key-value server (Redis), unbounded history.
    Redis,
    /// In-process only; nothing survives the invocation.
    Memory,
    /// Old flat-file layout; read-only, migration source only.
    Legacy,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(StorageKind::Sqlite),
            "files" => Ok(StorageKind::Files),
            "redis" => Ok(StorageKind::Redis),
            "memory" => Ok(StorageKind::Memory),
            "legacy" => Ok(StorageKind::Legacy),
            other => Err(format!(
                "invalid storage kind: {other} (expected sqlite, files, redis, memory or legacy)"
            )),
        }
    }
}

/// How the diff reference is picked when several historical states are
/// compared and none matches exactly.
///
/// - `Latest`: always diff against the most recent snapshot.
/// - `Closest`: diff against the snapshot with the fewest inserted plus
///   deleted lines; ties go to the more recent snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceSelection {
    Latest,
    #[default]
    Closest,
}

/// Built-in report sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReporterKind {
    Stdout,
    Json,
}
