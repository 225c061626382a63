//! HTTP scraper.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use reqwest::header::ACCEPT;
use tokio_util::sync::CancellationToken;

use crate::http::check_error;
use crate::model::MetricsSlice;
use crate::target::{ScrapeTarget, ScraperType};

use super::prometheus::{self, ACCEPT_HEADER};
use super::{ScrapeError, Scraper};

/// Default per-fetch timeout (10 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Scraper that GETs the target URL and parses the body.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpScraper {
    client: Client,
    timeout: Duration,
}

impl HttpScraper {
    /// Build a scraper with its own client.
    ///
    /// # Errors
    /// Returns `ScrapeError::Config` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .user_agent(concat!("gather/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScrapeError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    /// Build a scraper around an existing client.
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_inner(&self, target: &ScrapeTarget) -> Result<MetricsSlice, ScrapeError> {
        let url = url::Url::parse(&target.url)
            .map_err(|e| ScrapeError::Config(format!("invalid target url '{}': {e}", target.url)))?;

        let transport = |source: reqwest::Error| {
            if source.is_timeout() {
                ScrapeError::Timeout {
                    url: target.url.clone(),
                    timeout: self.timeout,
                }
            } else {
                ScrapeError::Transport {
                    url: target.url.clone(),
                    source,
                }
            }
        };

        let response = self
            .client
            .get(url)
            .header(ACCEPT, ACCEPT_HEADER)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport)?;

        let response = check_error(response).await?;
        let body = response.text().await.map_err(transport)?;

        match target.scraper_type {
            ScraperType::Prometheus => Ok(prometheus::parse(&body, Utc::now())?),
        }
    }
}

#[async_trait::async_trait]
impl Scraper for HttpScraper {
    async fn fetch(
        &self,
        target: &ScrapeTarget,
        cancel: &CancellationToken,
    ) -> Result<MetricsSlice, ScrapeError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ScrapeError::Cancelled(target.url.clone())),
            result = self.fetch_inner(target) => result,
        }
    }
}
