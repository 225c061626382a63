//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulerConfig;
use crate::target::ScrapeTarget;

use super::targets::TargetsConfig;
use super::validation::{ConfigError, expand_env_vars, validate_http_url};

/// Default writer request timeout (10 seconds).
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

fn default_write_timeout() -> Duration {
    DEFAULT_WRITE_TIMEOUT
}

fn default_writer_url() -> String {
    "http://localhost:8086".to_string()
}

// =============================================================================
// Writer Configuration
// =============================================================================

/// Points writer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Base URL of the write service (default: "http://localhost:8086").
    #[serde(default = "default_writer_url")]
    pub url: String,

    /// API token, sent as `Authorization: Token <token>`.
    #[serde(default)]
    pub token: Option<String>,

    /// Request timeout (default: 10s).
    #[serde(default = "default_write_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            url: default_writer_url(),
            token: None,
            timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Points writer settings.
    #[serde(default)]
    pub writer: WriterConfig,

    /// Inline scrape targets.
    #[serde(default)]
    pub targets: Vec<ScrapeTarget>,

    /// Path to a directory with additional target files.
    #[serde(default)]
    pub target_path: Option<String>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` references in the writer URL, token and target URLs are
    /// expanded before validation.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = serde_yaml::from_str(&content)?;
        config.expand_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration including the target_path directory.
    ///
    /// If `target_path` is specified, scans the directory for YAML files
    /// and appends their targets.
    pub fn load_with_target_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;

        if let Some(ref target_dir) = config.target_path {
            let mut additional = TargetsConfig::load_from_dir(target_dir)?;
            additional.expand_env();
            config.targets.extend(additional.targets);
        }

        config.validate()?;
        Ok(config)
    }

    fn expand_env(&mut self) {
        self.writer.url = expand_env_vars(&self.writer.url);
        // An unset `${VAR:-}` token means no token.
        self.writer.token = self
            .writer
            .token
            .as_deref()
            .map(expand_env_vars)
            .filter(|t| !t.is_empty());
        for target in &mut self.targets {
            target.url = expand_env_vars(&target.url);
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("scheduler: {e}")))?;

        validate_http_url("writer url", &self.writer.url)?;
        if self.writer.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "writer timeout must be non-zero".to_string(),
            ));
        }

        TargetsConfig {
            targets: self.targets.clone(),
        }
        .validate()
    }
}
