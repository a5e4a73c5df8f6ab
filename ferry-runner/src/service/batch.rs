//! Batch assembly
//!
//! Turns raw records into envelope events:
//! - Unwrapping search messages (`{"map": {"_raw": "<json>"}}`)
//! - Deriving each record's instant from its `timestamp` field
//! - Appending events to the run's single envelope, in input order
//!
//! Search messages are validated one at a time. A malformed message is skipped
//! with a reason and never spoils the rest of the batch.

use chrono::{DateTime, Utc};
use ferry_core::domain::envelope::{Envelope, SourceMode};
use ferry_core::time::{self, TimestampError};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;

use crate::error::Result;

/// Field of a record holding its timestamp
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Why a search message did not make it into the batch
#[derive(Debug, Error, PartialEq)]
pub enum SkipReason {
    #[error("message has no `map` object")]
    MissingMap,

    #[error("message map has no string `_raw` field")]
    MissingRaw,

    #[error("`_raw` is not valid JSON: {0}")]
    RawNotJson(String),

    #[error("`_raw` is not a JSON object")]
    RawNotObject,

    #[error("unusable timestamp: {0}")]
    BadTimestamp(#[from] TimestampError),
}

/// A validated record ready to become an event
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord {
    /// Instant derived from the record, if it carries one
    pub instant: Option<DateTime<Utc>>,
    pub record: JsonValue,
}

impl PreparedRecord {
    /// Reads the instant out of `record`'s timestamp field
    ///
    /// A record without the field has no instant; a field that does not parse
    /// is an error.
    pub fn from_record(record: JsonValue) -> std::result::Result<Self, TimestampError> {
        let instant = match record.get(TIMESTAMP_FIELD) {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(text)) => Some(time::parse(text)?),
            Some(other) => Some(time::parse(&other.to_string())?),
        };

        Ok(Self { instant, record })
    }

    pub fn epoch_seconds(&self) -> Option<i64> {
        self.instant.map(time::to_epoch_seconds)
    }
}

/// Unwraps and validates search messages lazily, keeping their position
pub fn prepare_messages(
    messages: Vec<JsonValue>,
) -> impl Iterator<Item = (usize, std::result::Result<PreparedRecord, SkipReason>)> {
    messages
        .into_iter()
        .enumerate()
        .map(|(position, message)| (position, prepare_message(message)))
}

/// Unwraps one search message
pub fn prepare_message(message: JsonValue) -> std::result::Result<PreparedRecord, SkipReason> {
    let map = message
        .get("map")
        .and_then(JsonValue::as_object)
        .ok_or(SkipReason::MissingMap)?;

    let raw = map
        .get("_raw")
        .and_then(JsonValue::as_str)
        .ok_or(SkipReason::MissingRaw)?;

    let record: JsonValue =
        serde_json::from_str(raw).map_err(|e| SkipReason::RawNotJson(e.to_string()))?;

    if !record.is_object() {
        return Err(SkipReason::RawNotObject);
    }

    Ok(PreparedRecord::from_record(record)?)
}

/// Parses a payload handed to the process directly
///
/// Unlike search messages, a bad payload is fatal for the run.
pub fn prepare_payload(payload: &str) -> Result<PreparedRecord> {
    let record: JsonValue = serde_json::from_str(payload)?;
    Ok(PreparedRecord::from_record(record)?)
}

/// Builds the single envelope of a run
pub struct BatchAssembler {
    envelope: Envelope,
    skipped: usize,
}

impl BatchAssembler {
    pub fn new(source: SourceMode) -> Self {
        Self {
            envelope: Envelope::new(source),
            skipped: 0,
        }
    }

    /// Appends a record as the next event
    ///
    /// # Returns
    /// The record's instant in epoch seconds, for checkpointing
    pub fn push(&mut self, prepared: PreparedRecord) -> Option<i64> {
        let seconds = prepared.epoch_seconds();
        let nanos = prepared.instant.map(time::to_epoch_nanos);

        self.envelope.append_message(nanos, prepared.record);
        seconds
    }

    /// Records a message that was left out of the batch
    pub fn skip(&mut self, position: usize, reason: &SkipReason) {
        self.skipped += 1;
        warn!(position, %reason, "Skipping search message");
    }

    pub fn len(&self) -> usize {
        self.envelope.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelope.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn finish(self) -> Envelope {
        self.envelope
    }
}
