//! `Retry-After` header parsing
//!
//! Graph sends `Retry-After` on 429 and 503 responses. The value is either
//! an integer number of seconds or an HTTP-date.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::warn;

/// Upper bound accepted for an HTTP-date `Retry-After`
const MAX_DATE_DELAY_SECS: u64 = 3600;

/// Parses a `Retry-After` header value
///
/// The header can be either:
/// - An integer number of seconds (e.g., "30")
/// - An HTTP-date (e.g., "Fri, 31 Dec 2025 23:59:59 GMT") - parsed as seconds from now
///
/// Returns `None` if the value cannot be used, so the caller applies its
/// own default.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        let secs = u64::try_from(diff.num_seconds()).unwrap_or(0);
        if secs <= MAX_DATE_DELAY_SECS {
            return Some(Duration::from_secs(secs));
        }
    }

    warn!(value, "Could not parse Retry-After header");
    None
}

/// Extracts the `Retry-After` delay from response headers
pub fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}
