//! Upstream HTTP response classification.
//!
//! - [`check_error`]: turn a `reqwest::Response` into a [`PlatformError`]
//! - [`classify`]: the transport-free core, operating on status/headers/body
//! - [`parse_retry_after`]: `Retry-After` header interpretation (RFC 9110)

mod check;
mod retry_after;

pub use check::{MAX_ERROR_BODY_BYTES, check_error, classify};
pub use retry_after::parse_retry_after;
