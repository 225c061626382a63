//! `Retry-After` header parsing.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

/// HTTP-date layouts accepted by RFC 9110: IMF-fixdate, obsolete RFC 850
/// and ANSI C asctime.
const HTTP_DATE_FORMATS: [&str; 3] = [
    "%a, %d %b %Y %H:%M:%S GMT",
    "%A, %d-%b-%y %H:%M:%S GMT",
    "%a %b %e %H:%M:%S %Y",
];

/// Parse a `Retry-After` value relative to `now`.
///
/// - delay-seconds: returned as-is, `0` included
/// - HTTP-date: the time left until that date, clamped to zero if it is
///   already in the past
///
/// Returns `None` for an empty or unrecognised value.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse::<u64>().ok().map(Duration::from_secs);
    }

    let date = parse_http_date(value)?;
    Some((date - now).to_std().unwrap_or(Duration::ZERO))
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    HTTP_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
