//! Scrape target configuration.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::target::ScrapeTarget;

use super::validation::{ConfigError, expand_env_vars, validate_http_url};

/// A list of scrape targets, either inline in the main config or in one of
/// the files under `target_path`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetsConfig {
    #[serde(default)]
    pub targets: Vec<ScrapeTarget>,
}

impl TargetsConfig {
    /// Merge another TargetsConfig into this one.
    #[must_use]
    pub fn merge(mut self, other: TargetsConfig) -> Self {
        self.targets.extend(other.targets);
        self
    }

    /// Expand `${VAR}` references in target URLs.
    pub fn expand_env(&mut self) {
        for target in &mut self.targets {
            target.url = expand_env_vars(&target.url);
        }
    }

    /// Validate all targets: unique ids and usable URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_ids = HashSet::new();

        for target in &self.targets {
            if !seen_ids.insert(target.id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate target id: '{}'",
                    target.id
                )));
            }
            validate_http_url(&format!("target '{}'", target.id), &target.url)?;
            if target.interval.is_some_and(|d| d.is_zero()) {
                return Err(ConfigError::ValidationError(format!(
                    "target '{}': interval must be non-zero",
                    target.id
                )));
            }
        }

        Ok(())
    }

    /// Load target lists from all YAML files in a directory.
    pub fn load_from_dir(dir_path: &str) -> Result<Self, ConfigError> {
        let dir = Path::new(dir_path);
        if !dir.exists() {
            return Err(ConfigError::ValidationError(format!(
                "target_path '{dir_path}' does not exist"
            )));
        }
        if !dir.is_dir() {
            return Err(ConfigError::ValidationError(format!(
                "target_path '{dir_path}' is not a directory"
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if path.is_file() && (ext == "yaml" || ext == "yml") {
                paths.push(path);
            }
        }
        // Directory order is unspecified; keep loading deterministic.
        paths.sort();

        let mut merged = Self::default();
        for path in paths {
            tracing::debug!(path = %path.display(), "Loading target config");
            let content = std::fs::read_to_string(&path)?;
            let file_config: Self = serde_yaml::from_str(&content).map_err(|e| {
                ConfigError::ValidationError(format!("failed to parse '{}': {e}", path.display()))
            })?;
            merged = merged.merge(file_config);
        }

        Ok(merged)
    }
}
