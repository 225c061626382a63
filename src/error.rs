//! Platform error model.
//!
//! [`PlatformError`] classifies a failure by a symbolic [`ErrorCode`] that is
//! independent of the transport status that produced it. Its optional cause
//! may be a [`RetriableError`], which carries the delay an upstream asked us
//! to wait before trying again. [`RetryHint`] reads that delay back out of
//! any error type in the crate.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Symbolic error code.
///
/// The string forms are the ones upstream services put in the `code` field
/// of a JSON error body.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
pub enum ErrorCode {
    #[strum(serialize = "internal error")]
    #[serde(rename = "internal error")]
    Internal,
    #[strum(serialize = "not found")]
    #[serde(rename = "not found")]
    NotFound,
    #[strum(serialize = "conflict")]
    #[serde(rename = "conflict")]
    Conflict,
    #[strum(serialize = "invalid")]
    #[serde(rename = "invalid")]
    Invalid,
    #[strum(serialize = "unprocessable entity")]
    #[serde(rename = "unprocessable entity")]
    UnprocessableEntity,
    #[strum(serialize = "empty value")]
    #[serde(rename = "empty value")]
    EmptyValue,
    #[strum(serialize = "unavailable")]
    #[serde(rename = "unavailable")]
    Unavailable,
    #[strum(serialize = "forbidden")]
    #[serde(rename = "forbidden")]
    Forbidden,
    #[strum(serialize = "too many requests")]
    #[serde(rename = "too many requests")]
    TooManyRequests,
    #[strum(serialize = "unauthorized")]
    #[serde(rename = "unauthorized")]
    Unauthorized,
    #[strum(serialize = "method not allowed")]
    #[serde(rename = "method not allowed")]
    MethodNotAllowed,
    #[strum(serialize = "request too large")]
    #[serde(rename = "request too large")]
    RequestTooLarge,
    #[strum(serialize = "unsupported media type")]
    #[serde(rename = "unsupported media type")]
    UnsupportedMediaType,
}

impl ErrorCode {
    /// Map a code string from an error body, falling back to `Internal`.
    pub fn from_code_str(code: &str) -> Self {
        code.parse().unwrap_or(Self::Internal)
    }

    /// Derive a code from an HTTP status when the body carries none.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::Invalid,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            405 => Self::MethodNotAllowed,
            409 => Self::Conflict,
            413 => Self::RequestTooLarge,
            415 => Self::UnsupportedMediaType,
            422 => Self::UnprocessableEntity,
            429 => Self::TooManyRequests,
            503 => Self::Unavailable,
            _ => Self::Internal,
        }
    }
}

/// An error annotated with the delay an upstream suggested before retrying.
///
/// A zero delay means retrying right away is acceptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetriableError {
    source: Option<String>,
    retry_after: Duration,
}

impl RetriableError {
    pub fn new(source: Option<String>, retry_after: Duration) -> Self {
        Self {
            source,
            retry_after,
        }
    }

    /// Suggested delay before retrying.
    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }

    /// Text of the wrapped error, if any.
    pub fn source_text(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

impl fmt::Display for RetriableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source.as_deref().unwrap_or(""))
    }
}

impl std::error::Error for RetriableError {}

/// The wrapped cause of a [`PlatformError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCause {
    /// Plain error text, e.g. an upstream message or raw body.
    Text(String),
    /// Error text with retry guidance attached.
    Retriable(RetriableError),
}

impl ErrorCause {
    /// Text of the cause without retry annotations.
    pub fn text(&self) -> &str {
        match self {
            Self::Text(s) => s,
            Self::Retriable(r) => r.source_text().unwrap_or(""),
        }
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Retriable(r) => fmt::Display::fmt(r, f),
        }
    }
}

/// Typed platform error.
///
/// Created at the point of failure and never mutated afterwards; the
/// builder-style `with_*` methods are for construction only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError {
    code: ErrorCode,
    message: Option<String>,
    cause: Option<ErrorCause>,
}

impl PlatformError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: None,
            cause: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(ErrorCause::Text(cause.into()));
        self
    }

    /// Wrap the current cause in a [`RetriableError`] with the given delay.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        let source = match self.cause.take() {
            Some(ErrorCause::Text(s)) => Some(s),
            Some(ErrorCause::Retriable(r)) => r.source,
            None => None,
        };
        self.cause = Some(ErrorCause::Retriable(RetriableError::new(
            source,
            retry_after,
        )));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }
}

/// Typed access to the retry guidance an error carries.
///
/// `None` means no guidance is available, which is distinct from
/// `Some(Duration::ZERO)` ("retrying now is fine").
pub trait RetryHint {
    fn retry_after(&self) -> Option<Duration>;
}

impl RetryHint for PlatformError {
    fn retry_after(&self) -> Option<Duration> {
        match &self.cause {
            Some(ErrorCause::Retriable(r)) => Some(r.retry_after()),
            _ => None,
        }
    }
}

/// A successful result never carries retry guidance.
impl<T, E: RetryHint> RetryHint for Result<T, E> {
    fn retry_after(&self) -> Option<Duration> {
        self.as_ref().err().and_then(RetryHint::retry_after)
    }
}

impl<E: RetryHint> RetryHint for Option<E> {
    fn retry_after(&self) -> Option<Duration> {
        self.as_ref().and_then(RetryHint::retry_after)
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, &self.cause) {
            (Some(msg), Some(cause)) => write!(f, "{msg}: {cause}"),
            (Some(msg), None) => f.write_str(msg),
            (None, Some(cause)) => fmt::Display::fmt(cause, f),
            (None, None) => write!(f, "<{}>", self.code),
        }
    }
}

impl std::error::Error for PlatformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            Some(ErrorCause::Retriable(r)) => Some(r),
            _ => None,
        }
    }
}
