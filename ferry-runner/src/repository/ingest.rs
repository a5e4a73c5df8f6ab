//! Ingest repository

use async_trait::async_trait;
use ferry_client::{IngestClient, Result};

/// Repository trait for posting serialized envelopes
#[async_trait]
pub trait IngestRepository: Send + Sync {
    /// Posts one serialized envelope
    ///
    /// # Returns
    /// The response body of a 2xx response
    async fn add_events(&self, body: Vec<u8>) -> Result<String>;
}

/// HTTP implementation of IngestRepository
pub struct HttpIngestRepository {
    client: IngestClient,
}

impl HttpIngestRepository {
    pub fn new(client: IngestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IngestRepository for HttpIngestRepository {
    async fn add_events(&self, body: Vec<u8>) -> Result<String> {
        self.client.add_events_json(body).await
    }
}
