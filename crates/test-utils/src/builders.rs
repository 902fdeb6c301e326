#![allow(dead_code)]

use snapwatch::config::{
    BrowserConfig, ConfigFile, ConfigSection, HttpCode, JobConfig, RawConfigFile, ReporterConfig,
    StorageConfig,
};
use snapwatch::types::StorageKind;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                storage: StorageConfig {
                    kind: StorageKind::Memory,
                    ..StorageConfig::default()
                },
                browser: BrowserConfig::default(),
                reporter: vec![],
                job: vec![],
            },
        }
    }

    pub fn with_job(mut self, job: JobConfig) -> Self {
        self.config.job.push(job);
        self
    }

    pub fn with_storage(mut self, kind: StorageKind, max_snapshots: usize) -> Self {
        self.config.storage.kind = kind;
        self.config.storage.max_snapshots = max_snapshots;
        self
    }

    pub fn with_reporter(mut self, reporter: ReporterConfig) -> Self {
        self.config.reporter.push(reporter);
        self
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.config.config.max_workers = Some(n);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `JobConfig`.
pub struct JobConfigBuilder {
    job: JobConfig,
}

impl JobConfigBuilder {
    pub fn url(url: &str) -> Self {
        Self {
            job: JobConfig {
                url: Some(url.to_string()),
                ..JobConfig::default()
            },
        }
    }

    pub fn command(cmd: &str) -> Self {
        Self {
            job: JobConfig {
                command: Some(cmd.to_string()),
                ..JobConfig::default()
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.job.name = Some(name.to_string());
        self
    }

    pub fn browser(mut self) -> Self {
        self.job.browser = true;
        self
    }

    pub fn max_tries(mut self, n: u32) -> Self {
        self.job.max_tries = Some(n);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.job.timeout_secs = Some(secs);
        self
    }

    pub fn compared_versions(mut self, n: usize) -> Self {
        self.job.compared_versions = Some(n);
        self
    }

    pub fn max_snapshots(mut self, n: usize) -> Self {
        self.job.max_snapshots = Some(n);
        self
    }

    pub fn conditional(mut self, val: bool) -> Self {
        self.job.conditional = Some(val);
        self
    }

    pub fn ignore_http(mut self, code: &str) -> Self {
        self.job.ignore_http_error_codes.push(HttpCode::Text(code.to_string()));
        self
    }

    pub fn ignore_connection_errors(mut self) -> Self {
        self.job.ignore_connection_errors = true;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.job.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn filter(mut self, spec: &str) -> Self {
        self.job.filters.push(spec.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.job.enabled = Some(false);
        self
    }

    pub fn build(self) -> JobConfig {
        self.job
    }
}
