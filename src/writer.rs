//! Point delivery.

mod http;

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorCode, PlatformError, RetryHint};
use crate::model::Point;
use crate::target::PlatformId;

pub use http::HttpPointsWriter;

/// Errors returned by a [`PointsWriter`].
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("write request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("write rejected: {0}")]
    Upstream(#[from] PlatformError),

    #[error("write cancelled")]
    Cancelled,

    #[error("writer config error: {0}")]
    Config(String),
}

impl WriteError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Upstream(err) => err.code(),
            Self::Transport(_) | Self::Cancelled => ErrorCode::Unavailable,
            Self::Config(_) => ErrorCode::Invalid,
        }
    }
}

impl RetryHint for WriteError {
    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Upstream(err) => err.retry_after(),
            _ => None,
        }
    }
}

/// Destination for converted points.
///
/// Called once per successful fetch with every point of that fetch.
#[async_trait::async_trait]
pub trait PointsWriter: Send + Sync + 'static {
    async fn write_points(
        &self,
        cancel: &CancellationToken,
        org_id: PlatformId,
        bucket_id: PlatformId,
        points: Vec<Point>,
    ) -> Result<(), WriteError>;
}
