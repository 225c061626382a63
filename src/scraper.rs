//! Scrape execution.
//!
//! A [`Scraper`] fetches one target and parses its body into a
//! [`MetricsSlice`]. [`HttpScraper`] is the production implementation; the
//! body format is chosen by [`ScraperType`](crate::target::ScraperType).

mod client;
pub mod prometheus;

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorCode, PlatformError, RetryHint};
use crate::model::MetricsSlice;
use crate::target::ScrapeTarget;

pub use client::{DEFAULT_FETCH_TIMEOUT, HttpScraper};
pub use prometheus::ParseError;

/// Errors that can occur while scraping a target.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Connection or protocol failure.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The fetch did not finish in time.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// The scheduler is shutting down.
    #[error("scrape of {0} cancelled")]
    Cancelled(String),

    /// The target answered with a non-success status.
    #[error("upstream error: {0}")]
    Upstream(#[from] PlatformError),

    /// The body could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The target itself is unusable, e.g. an invalid URL.
    #[error("config error: {0}")]
    Config(String),
}

impl ScrapeError {
    /// Symbolic code used when logging the failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Upstream(err) => err.code(),
            Self::Transport { .. } | Self::Timeout { .. } | Self::Cancelled(_) => {
                ErrorCode::Unavailable
            }
            Self::Parse(_) | Self::Config(_) => ErrorCode::Invalid,
        }
    }
}

impl RetryHint for ScrapeError {
    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Upstream(err) => err.retry_after(),
            _ => None,
        }
    }
}

/// Fetches and parses one target.
#[async_trait::async_trait]
pub trait Scraper: Send + Sync + 'static {
    /// Fetch `target` once.
    ///
    /// Must return promptly with [`ScrapeError::Cancelled`] once `cancel`
    /// fires.
    async fn fetch(
        &self,
        target: &ScrapeTarget,
        cancel: &CancellationToken,
    ) -> Result<MetricsSlice, ScrapeError>;
}
