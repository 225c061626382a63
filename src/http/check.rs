//! HTTP response to [`PlatformError`] classification.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use serde::Deserialize;

use crate::error::{ErrorCode, PlatformError};

use super::retry_after::parse_retry_after;

/// Upper bound on how much of an error body is buffered.
pub const MAX_ERROR_BODY_BYTES: usize = 1024 * 1024;

/// JSON error payload returned by platform-compatible services.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Check a response and turn any non-2xx status into a [`PlatformError`].
///
/// A successful response is handed back untouched so its body can still be
/// read. Otherwise the body is buffered, up to [`MAX_ERROR_BODY_BYTES`]; a
/// read failure leaves an empty body rather than failing classification.
pub async fn check_error(
    mut response: reqwest::Response,
) -> Result<reqwest::Response, PlatformError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let headers = response.headers().clone();

    let mut body = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = MAX_ERROR_BODY_BYTES - body.len();
                body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                if body.len() >= MAX_ERROR_BODY_BYTES {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(status = %status, error = %e, "Failed to read error body");
                body.clear();
                break;
            }
        }
    }

    match classify(status, &headers, &body, Utc::now()) {
        Some(err) => Err(err),
        None => Ok(response),
    }
}

/// Classify a response given its parts. Returns `None` for 2xx statuses.
///
/// `now` anchors HTTP-date `Retry-After` values.
pub fn classify(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
    now: DateTime<Utc>,
) -> Option<PlatformError> {
    if status.is_success() {
        return None;
    }
    if !status.is_client_error() && !status.is_server_error() {
        return Some(
            PlatformError::new(ErrorCode::Internal).with_message(format!(
                "unexpected status code: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )),
        );
    }

    let body = String::from_utf8_lossy(body);
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(media_type);

    let err = match content_type.as_deref() {
        Some(ct) if is_json(ct) => decode_error(status, &body),
        Some(_) if !looks_like_json(&body) => {
            PlatformError::new(ErrorCode::from_status(status.as_u16())).with_cause(body.trim())
        }
        // Missing or mislabelled content type: try JSON anyway.
        _ => decode_error(status, &body),
    };

    if status != StatusCode::TOO_MANY_REQUESTS {
        return Some(err);
    }

    let retry_after = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, now));
    Some(match retry_after {
        Some(delay) => err.with_retry_after(delay),
        None => err,
    })
}

fn decode_error(status: StatusCode, body: &str) -> PlatformError {
    let status_code = ErrorCode::from_status(status.as_u16());
    match decode_body(body) {
        Ok(decoded) => {
            let code = decoded
                .code
                .as_deref()
                .filter(|c| !c.is_empty())
                .map_or(status_code, ErrorCode::from_code_str);
            let mut err = PlatformError::new(code);
            if let Some(message) = decoded.message.filter(|m| !m.is_empty()) {
                err = err.with_message(message);
            }
            if let Some(cause) = decoded.error {
                err = err.with_cause(cause);
            }
            err
        }
        Err(e) => PlatformError::new(status_code)
            .with_message(format!(
                "attempted to unmarshal error as JSON but failed: \"{e}\""
            ))
            .with_cause(body.trim()),
    }
}

/// Decode an error body. Only a JSON object qualifies.
fn decode_body(body: &str) -> Result<ErrorBody, serde_json::Error> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(body)?;
    serde_json::from_value(serde_json::Value::Object(object))
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn is_json(media_type: &str) -> bool {
    media_type == "application/json" || media_type.ends_with("+json")
}

fn looks_like_json(body: &str) -> bool {
    matches!(body.trim_start().as_bytes().first(), Some(b'{' | b'['))
}
