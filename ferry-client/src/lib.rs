//! Ferry HTTP Clients
//!
//! Typed clients for the two remote services the pipeline talks to:
//! - [`SearchClient`]: search-job API (create, poll, fetch messages, delete)
//! - [`IngestClient`]: event ingestion endpoint (`addEvents`)
//!
//! # Example
//!
//! ```no_run
//! use ferry_client::SearchClient;
//! use ferry_core::dto::search::CreateSearchJob;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ferry_client::ClientError> {
//!     let client = SearchClient::new("https://api.sumologic.com/api", "id", "key")?;
//!
//!     let job = client.create_search_job(&CreateSearchJob {
//!         query: "_sourceCategory=*".to_string(),
//!         from: "2022-11-03T04:00:00".to_string(),
//!         to: "2022-11-03T04:30:00".to_string(),
//!         time_zone: "UTC".to_string(),
//!         by_receipt_time: false,
//!     }).await?;
//!
//!     println!("Created search job: {}", job.id);
//!     Ok(())
//! }
//! ```

pub mod error;
mod ingest;
mod search;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use ingest::IngestClient;
pub use search::SearchClient;

use serde::de::DeserializeOwned;

// =============================================================================
// Response Handlers
// =============================================================================

/// Handle an API response and deserialize JSON
///
/// Non-2xx responses become [`ClientError::ApiError`] carrying the body
/// verbatim.
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let body = handle_text_response(response).await?;

    serde_json::from_str(&body)
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle an API response and return its body as text
async fn handle_text_response(response: reqwest::Response) -> Result<String> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(response.text().await?)
}

/// Normalizes a base URL so paths can be appended with `/`
fn trim_base_url(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}
