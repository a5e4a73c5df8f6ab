//! Search job DTOs

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::search::JobState;

/// Request to create a search job
///
/// `from` and `to` are local-naive `YYYY-MM-DDTHH:MM:SS` strings, interpreted
/// by the service in `time_zone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSearchJob {
    pub query: String,
    pub from: String,
    pub to: String,
    pub time_zone: String,
    pub by_receipt_time: bool,
}

/// Response to a search job creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchJobCreated {
    pub id: String,
}

/// Search job status as reported by the service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchJobStatus {
    pub state: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub record_count: u64,
    #[serde(default)]
    pub pending_warnings: Vec<JsonValue>,
    #[serde(default)]
    pub pending_errors: Vec<JsonValue>,
}

impl SearchJobStatus {
    pub fn job_state(&self) -> JobState {
        JobState::from_remote(&self.state)
    }
}

/// A page of raw messages from a finished search job
///
/// Messages are kept as untyped JSON: each one is expected to look like
/// `{"map": {"_raw": "<json text>", ...}}` but is validated by the consumer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchMessages {
    #[serde(default)]
    pub fields: Vec<JsonValue>,
    #[serde(default)]
    pub messages: Vec<JsonValue>,
}
