//! Timestamp normalization
//!
//! Records carry free-form timestamp strings. They are turned into absolute
//! instants here, then into epoch seconds (checkpoint) or epoch nanoseconds
//! (envelope). Strings without an offset are read in local time, matching the
//! local-naive strings used to scope search queries.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Format of query-time strings sent to the search service
pub const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// `%#z` also takes hour-only offsets such as `+02`
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Unrecognized timestamp format: {0:?}")]
    Unrecognized(String),

    #[error("Local time {0} does not exist in this time zone")]
    NonexistentLocalTime(NaiveDateTime),

    #[error("Epoch seconds {0} out of range")]
    OutOfRange(i64),
}

/// Parses a timestamp, reading offset-less strings in local time
pub fn parse(text: &str) -> Result<DateTime<Utc>, TimestampError> {
    parse_in(text, &Local)
}

/// Parses a timestamp, reading offset-less strings in `zone`
pub fn parse_in<Tz: TimeZone>(text: &str, zone: &Tz) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    // A trailing `Z` is only understood by the RFC 3339 parser
    let with_offset = match trimmed.strip_suffix(['Z', 'z']) {
        Some(rest) => format!("{}+0000", rest),
        None => trimmed.to_string(),
    };

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&with_offset, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| TimestampError::Unrecognized(text.to_string()))?;

    zone.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(TimestampError::NonexistentLocalTime(naive))
}

pub fn to_epoch_seconds(instant: DateTime<Utc>) -> i64 {
    instant.timestamp()
}

/// Epoch nanoseconds with the sub-second part dropped
///
/// The envelope carries whole seconds expanded to nanoseconds, so two records
/// within the same second share a `ts`.
pub fn to_epoch_nanos(instant: DateTime<Utc>) -> i64 {
    to_epoch_seconds(instant).saturating_mul(NANOS_PER_SECOND)
}

/// Renders epoch seconds as a local-naive query time string
pub fn epoch_seconds_to_time_string(seconds: i64) -> Result<String, TimestampError> {
    epoch_seconds_to_time_string_in(seconds, &Local)
}

pub fn epoch_seconds_to_time_string_in<Tz: TimeZone>(
    seconds: i64,
    zone: &Tz,
) -> Result<String, TimestampError>
where
    Tz::Offset: std::fmt::Display,
{
    zone.timestamp_opt(seconds, 0)
        .single()
        .map(|dt| dt.format(QUERY_TIME_FORMAT).to_string())
        .ok_or(TimestampError::OutOfRange(seconds))
}
