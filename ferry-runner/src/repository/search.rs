//! Search repository
//!
//! Handles communication with the search service:
//! - Submitting search jobs
//! - Polling job status
//! - Fetching result messages
//! - Deleting finished jobs

use async_trait::async_trait;
use ferry_client::{Result, SearchClient};
use ferry_core::dto::search::{CreateSearchJob, SearchJobStatus};
use serde_json::Value as JsonValue;

/// Repository trait for search-job operations
#[async_trait]
pub trait SearchRepository: Send + Sync {
    /// Submits a search job
    ///
    /// # Returns
    /// The identifier of the new job
    async fn submit(&self, req: &CreateSearchJob) -> Result<String>;

    /// Fetches the current status of a job
    async fn status(&self, job_id: &str) -> Result<SearchJobStatus>;

    /// Fetches up to `limit` messages of a finished job, in result order
    async fn messages(&self, job_id: &str, limit: u64) -> Result<Vec<JsonValue>>;

    /// Deletes a job on the service side
    async fn delete(&self, job_id: &str) -> Result<()>;
}

/// HTTP implementation of SearchRepository
pub struct HttpSearchRepository {
    client: SearchClient,
}

impl HttpSearchRepository {
    pub fn new(client: SearchClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchRepository for HttpSearchRepository {
    async fn submit(&self, req: &CreateSearchJob) -> Result<String> {
        Ok(self.client.create_search_job(req).await?.id)
    }

    async fn status(&self, job_id: &str) -> Result<SearchJobStatus> {
        self.client.search_job_status(job_id).await
    }

    async fn messages(&self, job_id: &str, limit: u64) -> Result<Vec<JsonValue>> {
        let page = self.client.search_job_messages(job_id, 0, limit).await?;
        Ok(page.messages)
    }

    async fn delete(&self, job_id: &str) -> Result<()> {
        self.client.delete_search_job(job_id).await
    }
}
