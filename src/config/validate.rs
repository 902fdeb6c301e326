// src/config/validate.rs

use std::collections::HashMap;
use std::time::Duration;

use crate::config::model::{
    ConfigFile, ConfigSection, HttpCode, JobConfig, RawConfigFile, ReporterConfig, StorageConfig,
};
use crate::errors::{Result, SnapwatchError};
use crate::filter::FilterPipeline;
use crate::job::{ErrorTolerance, JobKind, JobSpec, StatusMatcher};
use crate::types::{ReporterKind, StorageKind};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SnapwatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_jobs(&raw)?;
        validate_global_config(&raw.config)?;
        validate_storage(&raw.storage)?;
        validate_reporters(&raw.reporter)?;

        let mut jobs = Vec::with_capacity(raw.job.len());
        for (pos, job) in raw.job.iter().enumerate() {
            jobs.push(build_job_spec(pos + 1, job, &raw.config)?);
        }
        ensure_unique_keys(&jobs)?;

        Ok(ConfigFile::new_unchecked(
            raw.config,
            raw.storage,
            raw.browser,
            raw.reporter,
            jobs,
        ))
    }
}

fn config_error(msg: impl Into<String>) -> SnapwatchError {
    SnapwatchError::ConfigError(msg.into())
}

fn ensure_has_jobs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.is_empty() {
        return Err(config_error("config must contain at least one [[job]] entry"));
    }
    Ok(())
}

fn validate_global_config(cfg: &ConfigSection) -> Result<()> {
    if cfg.max_workers == Some(0) {
        return Err(config_error("[config].max_workers must be >= 1 (got 0)"));
    }
    if cfg.light_workers_per_cpu == 0 {
        return Err(config_error("[config].light_workers_per_cpu must be >= 1 (got 0)"));
    }
    if cfg.light_max_workers == 0 {
        return Err(config_error("[config].light_max_workers must be >= 1 (got 0)"));
    }
    if cfg.heavy_instance_memory_mb == 0 {
        return Err(config_error("[config].heavy_instance_memory_mb must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_storage(cfg: &StorageConfig) -> Result<()> {
    if cfg.kind == StorageKind::Redis && cfg.url.is_none() {
        return Err(config_error("[storage].url is required when kind = \"redis\""));
    }
    Ok(())
}

fn validate_reporters(reporters: &[ReporterConfig]) -> Result<()> {
    for (idx, reporter) in reporters.iter().enumerate() {
        if reporter.kind == ReporterKind::Json && reporter.path.is_none() {
            return Err(config_error(format!(
                "[[reporter]] #{} of kind \"json\" needs a `path`",
                idx + 1
            )));
        }
    }
    Ok(())
}

fn build_job_spec(index: usize, job: &JobConfig, defaults: &ConfigSection) -> Result<JobSpec> {
    let label = job.name.clone().unwrap_or_else(|| format!("#{index}"));

    let (kind, location) = match (&job.url, &job.command) {
        (Some(url), None) => {
            let kind = if job.browser { JobKind::Browser } else { JobKind::Url };
            (kind, url.clone())
        }
        (None, Some(command)) => {
            if job.browser {
                return Err(config_error(format!(
                    "job '{label}': `browser = true` only applies to `url` jobs"
                )));
            }
            (JobKind::Command, command.clone())
        }
        (Some(_), Some(_)) => {
            return Err(config_error(format!(
                "job '{label}' sets both `url` and `command`"
            )));
        }
        (None, None) => {
            return Err(config_error(format!(
                "job '{label}' needs either `url` or `command`"
            )));
        }
    };

    if location.trim().is_empty() {
        return Err(config_error(format!("job '{label}' has an empty location")));
    }

    let max_tries = job.max_tries.unwrap_or(1);
    if max_tries == 0 {
        return Err(config_error(format!("job '{label}': max_tries must be >= 1")));
    }

    let compared_versions = job.compared_versions.unwrap_or(1);
    if compared_versions == 0 {
        return Err(config_error(format!(
            "job '{label}': compared_versions must be >= 1"
        )));
    }

    let filters = FilterPipeline::from_specs(&job.filters)
        .map_err(|e| config_error(format!("job '{label}': {e}")))?;

    let mut http_status = Vec::with_capacity(job.ignore_http_error_codes.len());
    for code in &job.ignore_http_error_codes {
        let raw = match code {
            HttpCode::Code(c) => c.to_string(),
            HttpCode::Text(s) => s.clone(),
        };
        let matcher = StatusMatcher::parse(&raw).ok_or_else(|| {
            config_error(format!(
                "job '{label}': invalid entry '{raw}' in ignore_http_error_codes"
            ))
        })?;
        http_status.push(matcher);
    }

    let timeout_secs = job.timeout_secs.unwrap_or(defaults.default_timeout_secs);

    Ok(JobSpec {
        index,
        name: job.name.clone(),
        kind,
        location,
        headers: job.headers.clone(),
        max_tries,
        timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        compared_versions,
        max_snapshots: job.max_snapshots,
        conditional: job.conditional.unwrap_or(true),
        tolerance: ErrorTolerance {
            connection: job.ignore_connection_errors,
            timeout: job.ignore_timeout_errors,
            too_many_redirects: job.ignore_too_many_redirects,
            http_status,
        },
        filters,
        enabled: job.enabled.unwrap_or(true),
    })
}

/// Two jobs must never share a snapshot key.
fn ensure_unique_keys(jobs: &[JobSpec]) -> Result<()> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for job in jobs {
        if let Some(first) = seen.insert(job.key(), job.index) {
            return Err(config_error(format!(
                "jobs #{} and #{} share the key '{}'",
                first,
                job.index,
                job.key()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn defaults_are_applied() {
        let cfg = parse(
            r#"
[[job]]
url = "https://example.org/"

[[job]]
command = "date"
timeout_secs = 0
"#,
        )
        .unwrap();

        assert_eq!(cfg.storage.kind, StorageKind::Sqlite);
        assert_eq!(cfg.storage.max_snapshots, 4);
        assert_eq!(cfg.jobs.len(), 2);

        let url = &cfg.jobs[0];
        assert_eq!(url.index, 1);
        assert_eq!(url.kind, JobKind::Url);
        assert_eq!(url.timeout, Some(Duration::from_secs(60)));
        assert_eq!(url.compared_versions, 1);
        assert!(url.uses_conditional_fetch());

        let cmd = &cfg.jobs[1];
        assert_eq!(cmd.kind, JobKind::Command);
        assert_eq!(cmd.timeout, None);
        assert!(!cmd.uses_conditional_fetch());
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = parse(
            r#"
[[job]]
url = "https://example.org/"

[[job]]
name = "again"
url = "https://example.org/"
browser = true
"#,
        )
        .unwrap_err();
        match err {
            SnapwatchError::ConfigError(msg) => assert!(msg.contains("share the key")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn job_needs_exactly_one_location() {
        assert!(parse("[[job]]\nname = \"x\"\n").is_err());
        assert!(parse("[[job]]\nurl = \"http://a\"\ncommand = \"ls\"\n").is_err());
        assert!(parse("[[job]]\ncommand = \"ls\"\nbrowser = true\n").is_err());
    }

    #[test]
    fn mixed_http_codes_parse() {
        let cfg = parse(
            r#"
[[job]]
url = "https://example.org/"
ignore_http_error_codes = [404, "5xx"]
"#,
        )
        .unwrap();
        let tol = &cfg.jobs[0].tolerance;
        assert!(tol.tolerates_status(404));
        assert!(tol.tolerates_status(502));
        assert!(!tol.tolerates_status(403));
    }

    #[test]
    fn json_reporter_needs_a_path() {
        let err = parse(
            r#"
[[reporter]]
kind = "json"

[[job]]
command = "true"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SnapwatchError::ConfigError(_)));
    }
}
