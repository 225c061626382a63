//! Gather - scrape scheduler for a time-series platform
//!
//! Periodically polls metric endpoints, converts what they expose into
//! storage points and hands those points to a writer, with bounded
//! concurrency and graceful shutdown. Upstream HTTP failures are classified
//! into a symbolic [`ErrorCode`] and keep any `Retry-After` guidance the
//! server sent.
//!
//! # Architecture
//!
//! - **Scheduler**: per-target timers, a bounded job queue and a fixed worker pool
//! - **Scraper**: HTTP fetch plus Prometheus text format parsing
//! - **Model**: metrics and their conversion into length-bounded points
//! - **HTTP**: response classification and `Retry-After` parsing
//! - **Writer**: line-protocol delivery to `/api/v2/write`
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use gather::{HttpPointsWriter, Scheduler, SchedulerConfig, StaticTargetStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = StaticTargetStore::default();
//!     let writer = HttpPointsWriter::new("http://localhost:8086", Duration::from_secs(10))?;
//!
//!     let scheduler = Scheduler::new(SchedulerConfig::default(), Arc::new(store), Arc::new(writer))?;
//!     scheduler.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     scheduler.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod scheduler;
pub mod scraper;
pub mod target;
pub mod writer;

pub use error::{ErrorCode, PlatformError, RetriableError, RetryHint};
pub use http::{check_error, parse_retry_after};
pub use model::{ConversionError, Metric, MetricType, MetricsSlice, Point, PointsConversion};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError, SchedulerState};
pub use scraper::{HttpScraper, ScrapeError, Scraper};
pub use target::{PlatformId, ScrapeTarget, StaticTargetStore, TargetStore};
pub use writer::{HttpPointsWriter, PointsWriter, WriteError};
