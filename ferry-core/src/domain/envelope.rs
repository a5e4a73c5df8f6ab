//! Ingestion envelope domain types
//!
//! One [`Envelope`] is built per run and posted to the ingestion service in a
//! single request. The JSON shape follows the ingestion service's
//! `addEvents` body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Identifier of the single log descriptor every event points at
pub const LOG_ID: &str = "1";

/// Where the events of an envelope came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Records pulled from the search service
    Sumo,
    /// A JSON payload handed to the process directly
    Json,
}

impl SourceMode {
    /// Session tag written to the envelope
    pub fn session(self) -> &'static str {
        match self {
            SourceMode::Sumo => "sumo",
            SourceMode::Json => "json",
        }
    }

    /// `serverHost` tag written to the envelope
    pub fn server_host(self) -> &'static str {
        match self {
            SourceMode::Sumo => "sumoLogic",
            SourceMode::Json => "script",
        }
    }
}

impl std::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.session())
    }
}

/// Batched payload sent to the ingestion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub session: String,
    pub session_info: SessionInfo,
    pub logs: Vec<LogDescriptor>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub server_host: String,
}

/// Describes how the receiving side parses the events of a log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogDescriptor {
    pub id: String,
    pub attrs: LogAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogAttributes {
    pub parser: String,
}

/// One normalized unit inside an envelope
///
/// `ts` is carried as a decimal string of epoch nanoseconds on the wire. When
/// absent, the ingestion service stamps the event with its arrival time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "log")]
    pub log_ref: String,
    #[serde(
        rename = "ts",
        default,
        skip_serializing_if = "Option::is_none",
        with = "nanos_string"
    )]
    pub timestamp_nanos: Option<i64>,
    pub attrs: Map<String, JsonValue>,
}

impl Event {
    /// The original record carried under `attrs.message`
    pub fn message(&self) -> Option<&JsonValue> {
        self.attrs.get("message")
    }
}

impl Envelope {
    /// Creates an empty envelope tagged with its source
    pub fn new(source: SourceMode) -> Self {
        Self {
            session: source.session().to_string(),
            session_info: SessionInfo {
                server_host: source.server_host().to_string(),
            },
            logs: vec![LogDescriptor {
                id: LOG_ID.to_string(),
                attrs: LogAttributes {
                    parser: "json".to_string(),
                },
            }],
            events: Vec::new(),
        }
    }

    /// Appends an event at the end of the batch
    pub fn append(&mut self, timestamp_nanos: Option<i64>, attrs: Map<String, JsonValue>) {
        self.events.push(Event {
            log_ref: LOG_ID.to_string(),
            timestamp_nanos,
            attrs,
        });
    }

    /// Appends `record` as the `message` attribute of a new event
    pub fn append_message(&mut self, timestamp_nanos: Option<i64>, record: JsonValue) {
        let mut attrs = Map::new();
        attrs.insert("message".to_string(), record);
        self.append(timestamp_nanos, attrs);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

mod nanos_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(nanos) => serializer.serialize_str(&nanos.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| s.parse::<i64>().map_err(D::Error::custom))
            .transpose()
    }
}
