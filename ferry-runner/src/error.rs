//! Error types for a pipeline run
//!
//! Every variant aborts the run. Recoverable conditions (missing checkpoint,
//! cancelled job, malformed search records, empty batch) never become errors;
//! they shrink the batch instead.

use ferry_client::ClientError;
use ferry_core::time::TimestampError;
use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Search job {job_id} still {state} after {attempts} status polls")]
    JobStalled {
        job_id: String,
        state: String,
        attempts: u32,
    },

    #[error("Search service error: {0}")]
    Search(#[source] ClientError),

    #[error("Malformed JSON payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Malformed timestamp: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("Failed to serialize envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Ingestion rejected the batch (status {status}): {body}")]
    Delivery { status: u16, body: String },

    #[error("Ingestion request failed: {0}")]
    Ingest(#[source] ClientError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_error() -> serde_json::Error {
        serde_json::from_str::<serde_json::Value>("{").unwrap_err()
    }

    #[test]
    fn test_inbound_and_outbound_json_errors_read_differently() {
        let inbound: PipelineError = json_error().into();
        assert!(inbound.to_string().starts_with("Malformed JSON payload"));

        let outbound = PipelineError::Encode(json_error());
        assert!(outbound.to_string().starts_with("Failed to serialize envelope"));
    }
}
