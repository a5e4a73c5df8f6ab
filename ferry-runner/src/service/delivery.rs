//! Delivery service
//!
//! Serializes the run's envelope and posts it once to the ingestion endpoint.
//! There is no retry: a rejected batch is reported with the endpoint's raw
//! response body and the run ends.

use ferry_client::ClientError;
use ferry_core::domain::envelope::Envelope;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::repository::IngestRepository;

/// Request size accepted by the ingestion endpoint
///
/// Larger envelopes are still sent; the endpoint decides what to do with them.
pub const MAX_PAYLOAD_BYTES: usize = 6 * 1024 * 1024;

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 2xx response, with its body
    Delivered { response: String },
    /// Non-2xx response, with its body verbatim
    Rejected { status: u16, body: String },
}

impl DeliveryOutcome {
    /// Turns a rejection into a [`PipelineError::Delivery`]
    pub fn into_result(self) -> Result<String> {
        match self {
            DeliveryOutcome::Delivered { response } => Ok(response),
            DeliveryOutcome::Rejected { status, body } => {
                Err(PipelineError::Delivery { status, body })
            }
        }
    }
}

pub struct Deliverer {
    repository: Arc<dyn IngestRepository>,
}

impl Deliverer {
    pub fn new(repository: Arc<dyn IngestRepository>) -> Self {
        Self { repository }
    }

    /// Posts `envelope` to the ingestion endpoint
    pub async fn send(&self, envelope: &Envelope) -> Result<DeliveryOutcome> {
        let body = serde_json::to_vec(envelope).map_err(PipelineError::Encode)?;

        if body.len() > MAX_PAYLOAD_BYTES {
            warn!(
                bytes = body.len(),
                limit = MAX_PAYLOAD_BYTES,
                "Envelope exceeds the ingestion payload limit"
            );
        }

        info!(events = envelope.len(), bytes = body.len(), "Sending envelope");

        match self.repository.add_events(body).await {
            Ok(response) => {
                debug!(%response, "Envelope accepted");
                Ok(DeliveryOutcome::Delivered { response })
            }
            Err(ClientError::ApiError { status, message }) => {
                warn!(status, body = %message, "Envelope rejected");
                Ok(DeliveryOutcome::Rejected {
                    status,
                    body: message,
                })
            }
            Err(e) => Err(PipelineError::Ingest(e)),
        }
    }
}
