//! Scrape targets and the store they are listed from.
//!
//! The scheduler never owns targets: it asks a [`TargetStore`] for a fresh
//! snapshot on every tick. [`StaticTargetStore`] is an in-memory store for
//! hosts that load targets from configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tokio::sync::RwLock;

/// Length of the hex form of a [`PlatformId`].
pub const ID_LENGTH: usize = 16;

/// Errors parsing a [`PlatformId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("id must be 16 hex characters, got {0}")]
    Length(usize),

    #[error("id contains non-hex characters: '{0}'")]
    NotHex(String),

    #[error("id must not be zero")]
    Zero,
}

/// 64-bit platform identifier, written as 16 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlatformId(u64);

impl PlatformId {
    /// Create an id from its numeric value. Zero is invalid.
    pub fn new(value: u64) -> Result<Self, IdError> {
        if value == 0 {
            return Err(IdError::Zero);
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl FromStr for PlatformId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_LENGTH {
            return Err(IdError::Length(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IdError::NotHex(s.to_owned()));
        }
        let value = u64::from_str_radix(s, 16).map_err(|_| IdError::NotHex(s.to_owned()))?;
        Self::new(value)
    }
}

impl TryFrom<String> for PlatformId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PlatformId> for String {
    fn from(id: PlatformId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlatformId({self})")
    }
}

/// Parser used to read a target's response body.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ScraperType {
    /// Prometheus text exposition format.
    #[default]
    Prometheus,
}

/// A remote endpoint polled for metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeTarget {
    pub id: PlatformId,
    /// Display name (default: empty).
    #[serde(default)]
    pub name: String,
    /// Body parser (default: prometheus).
    #[serde(rename = "type", default)]
    pub scraper_type: ScraperType,
    pub url: String,
    pub org_id: PlatformId,
    pub bucket_id: PlatformId,
    /// Scrape interval; the scheduler tick is used when unset.
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
}

impl ScrapeTarget {
    pub fn new(
        id: PlatformId,
        url: impl Into<String>,
        org_id: PlatformId,
        bucket_id: PlatformId,
    ) -> Self {
        Self {
            id,
            name: String::new(),
            scraper_type: ScraperType::default(),
            url: url.into(),
            org_id,
            bucket_id,
            interval: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_scraper_type(mut self, scraper_type: ScraperType) -> Self {
        self.scraper_type = scraper_type;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

/// Errors returned by a [`TargetStore`].
#[derive(Debug, Error)]
pub enum TargetStoreError {
    #[error("target store unavailable: {0}")]
    Unavailable(String),

    #[error("target store error: {0}")]
    Internal(String),
}

/// Source of the current scrape target set.
///
/// Called once per scheduler tick. Implementations must return a consistent
/// snapshot.
#[async_trait::async_trait]
pub trait TargetStore: Send + Sync + 'static {
    async fn list_targets(&self) -> Result<Vec<ScrapeTarget>, TargetStoreError>;
}

/// In-memory target store whose snapshot can be swapped at runtime.
#[derive(Debug, Clone, Default)]
pub struct StaticTargetStore {
    targets: Arc<RwLock<Vec<ScrapeTarget>>>,
}

impl StaticTargetStore {
    pub fn new(targets: Vec<ScrapeTarget>) -> Self {
        Self {
            targets: Arc::new(RwLock::new(targets)),
        }
    }

    /// Replace the whole target set.
    pub async fn replace(&self, targets: Vec<ScrapeTarget>) {
        *self.targets.write().await = targets;
    }

    /// Insert a target, or replace the one with the same id.
    pub async fn upsert(&self, target: ScrapeTarget) {
        let mut targets = self.targets.write().await;
        match targets.iter_mut().find(|t| t.id == target.id) {
            Some(existing) => *existing = target,
            None => targets.push(target),
        }
    }

    /// Remove a target by id. Returns whether it was present.
    pub async fn remove(&self, id: PlatformId) -> bool {
        let mut targets = self.targets.write().await;
        let before = targets.len();
        targets.retain(|t| t.id != id);
        targets.len() != before
    }

    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.targets.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl TargetStore for StaticTargetStore {
    async fn list_targets(&self) -> Result<Vec<ScrapeTarget>, TargetStoreError> {
        Ok(self.targets.read().await.clone())
    }
}
