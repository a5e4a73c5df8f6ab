//! Search-job API client
//!
//! The search service authenticates with HTTP basic auth and ties a job to the
//! session cookie handed out on creation, so every request goes through the
//! same cookie-keeping [`Client`].

use ferry_core::dto::search::{
    CreateSearchJob, SearchJobCreated, SearchJobStatus, SearchMessages,
};
use reqwest::Client;
use tracing::debug;

use crate::error::Result;
use crate::{handle_response, handle_text_response, trim_base_url};

/// HTTP client for the search-job API
#[derive(Debug, Clone)]
pub struct SearchClient {
    /// Base URL of the API (e.g., "https://api.sumologic.com/api")
    base_url: String,
    access_id: String,
    access_key: String,
    client: Client,
}

impl SearchClient {
    /// Create a new search client with a cookie store enabled
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the API, without the `/v1` suffix
    /// * `access_id` - Basic auth user
    /// * `access_key` - Basic auth password
    pub fn new(
        base_url: impl Into<String>,
        access_id: impl Into<String>,
        access_key: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self::with_client(base_url, access_id, access_key, client))
    }

    /// Create a new search client with a custom HTTP client
    ///
    /// The client should keep cookies, or polls may land on a session that
    /// does not know the job.
    pub fn with_client(
        base_url: impl Into<String>,
        access_id: impl Into<String>,
        access_key: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            base_url: trim_base_url(base_url),
            access_id: access_id.into(),
            access_key: access_key.into(),
            client,
        }
    }

    /// Get the base URL of the API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/v1/search/jobs/{}", self.base_url, job_id)
    }

    /// Submit a new search job
    ///
    /// # Returns
    /// The identifier of the created job
    pub async fn create_search_job(&self, req: &CreateSearchJob) -> Result<SearchJobCreated> {
        let url = format!("{}/v1/search/jobs", self.base_url);
        debug!(from = %req.from, to = %req.to, "Creating search job");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.access_id, Some(&self.access_key))
            .json(req)
            .send()
            .await?;

        handle_response(response).await
    }

    /// Get the current status of a search job
    pub async fn search_job_status(&self, job_id: &str) -> Result<SearchJobStatus> {
        let response = self
            .client
            .get(self.job_url(job_id))
            .basic_auth(&self.access_id, Some(&self.access_key))
            .send()
            .await?;

        handle_response(response).await
    }

    /// Fetch a page of raw messages from a finished search job
    ///
    /// # Arguments
    /// * `job_id` - The search job identifier
    /// * `offset` - Index of the first message
    /// * `limit` - Maximum number of messages to return
    pub async fn search_job_messages(
        &self,
        job_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<SearchMessages> {
        let url = format!("{}/messages", self.job_url(job_id));
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.access_id, Some(&self.access_key))
            .query(&[("offset", offset), ("limit", limit)])
            .send()
            .await?;

        handle_response(response).await
    }

    /// Delete a search job, releasing it on the service side
    pub async fn delete_search_job(&self, job_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.job_url(job_id))
            .basic_auth(&self.access_id, Some(&self.access_key))
            .send()
            .await?;

        handle_text_response(response).await.map(|_| ())
    }
}
