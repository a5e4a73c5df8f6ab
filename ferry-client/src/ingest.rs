//! Ingestion endpoint client

use ferry_core::domain::envelope::Envelope;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use crate::error::{ClientError, Result};
use crate::{handle_text_response, trim_base_url};

/// HTTP client for the event ingestion endpoint
#[derive(Debug, Clone)]
pub struct IngestClient {
    /// Full URL of the `addEvents` endpoint
    endpoint: String,
    /// Write token sent as a bearer token
    token: String,
    client: Client,
}

impl IngestClient {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(endpoint, token, Client::new())
    }

    pub fn with_client(endpoint: impl Into<String>, token: impl Into<String>, client: Client) -> Self {
        Self {
            endpoint: trim_base_url(endpoint),
            token: token.into(),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post an envelope
    ///
    /// # Returns
    /// The response body on any 2xx status. Other statuses surface as
    /// [`ClientError::ApiError`] with the body verbatim.
    pub async fn add_events(&self, envelope: &Envelope) -> Result<String> {
        let body = serde_json::to_vec(envelope)
            .map_err(|e| ClientError::InvalidRequest(format!("Failed to serialize envelope: {}", e)))?;

        self.add_events_json(body).await
    }

    /// Post an already serialized envelope
    pub async fn add_events_json(&self, body: Vec<u8>) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        handle_text_response(response).await
    }
}
