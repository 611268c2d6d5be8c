//! Clock-skew window for the signed `Date` header.

use chrono::{DateTime, Utc};
use tracing::debug;

/// Check whether `date_header` is within `tolerance_ms` of the wall clock.
///
/// The header must be RFC 1123 (`Mon, 02 Jan 2006 15:04:05 MST`); a parse
/// failure rejects outright. `tolerance_ms <= 0` disables the window and any
/// parseable date passes. Equality with the tolerance counts as in range.
#[must_use]
pub fn check(date_header: &str, tolerance_ms: i64) -> bool {
    check_at(Utc::now(), date_header, tolerance_ms)
}

/// [`check`] against an explicit reference instant.
#[must_use]
pub fn check_at(now: DateTime<Utc>, date_header: &str, tolerance_ms: i64) -> bool {
    let parsed = match DateTime::parse_from_rfc2822(date_header) {
        Ok(t) => t.with_timezone(&Utc),
        Err(e) => {
            debug!(date = %date_header, error = %e, "Date parsing failed");
            return false;
        }
    };

    if tolerance_ms <= 0 {
        return true;
    }

    let delta = (now - parsed).num_milliseconds().abs();
    delta <= tolerance_ms
}
