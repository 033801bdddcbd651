//! Timestamp and date formatting.
//!
//! Timestamps are 64-bit signed millisecond counts since
//! 1970-01-01T00:00:00 UTC; dates are 32-bit signed day counts since
//! 1970-01-01. Both print in fixed-width ISO forms.

use chrono::{Duration, NaiveDate, TimeZone, Utc};

/// Milliseconds in one day.
pub const MS_PER_DAY: i64 = 86_400_000;

/// Formats a millisecond timestamp as `YYYY-MM-DDTHH:MM:SS.mmm` (UTC,
/// exactly 23 characters, no timezone suffix).
///
/// Timestamps outside chrono's representable range fall back to the raw
/// number.
pub fn format_timestamp(ts: i64) -> String {
    match Utc.timestamp_millis_opt(ts).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        None => ts.to_string(),
    }
}

/// Formats an epoch day count as `YYYY-MM-DD` (exactly 10 characters).
pub fn format_date(days: i32) -> String {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch date");
    match epoch.checked_add_signed(Duration::days(i64::from(days))) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => days.to_string(),
    }
}
