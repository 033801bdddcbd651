//! Shared machinery for the tickvault command-line tools.
//!
//! The interesting part is [`import`]: a delimited-file record parser
//! driven by an XML parser specification, used by `tickvault-import`.

pub mod import;

use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;

/// Parses a compact CLI timestamp of the form `YYYYMMDDThhmmss` with an
/// optional fractional-second suffix (e.g. `20080201T010000.250`), read as
/// UTC, into epoch milliseconds.
pub fn parse_compact_timestamp(text: &str) -> Result<i64> {
    for format in ["%Y%m%dT%H%M%S%.f", "%Y%m%dT%H%M%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }
    Err(anyhow!(
        "invalid timestamp '{}'; expected YYYYMMDDThhmmss with optional fractional seconds",
        text
    ))
}
