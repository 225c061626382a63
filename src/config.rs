//! Configuration module.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Scheduler settings (queue depth, workers, tick, timeouts)
//! - Writer settings (URL, token, timeout)
//! - Scrape targets, inline or from a target directory

mod app;
mod targets;
mod validation;

pub use app::{AppConfig, DEFAULT_WRITE_TIMEOUT, WriterConfig};
pub use targets::TargetsConfig;
pub use validation::{ConfigError, expand_env_vars, parse_duration, validate_http_url};
