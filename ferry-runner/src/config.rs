//! Runner configuration
//!
//! Defines every configurable parameter of a run: search service credentials
//! and query, poll bounds, ingestion endpoint, and checkpoint location.
//! Built once at start-up and passed by reference to each component.

use chrono_tz::Tz;
use ferry_core::domain::envelope::SourceMode;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.sumologic.com/api";
pub const DEFAULT_INGEST_ENDPOINT: &str = "https://app.scalyr.com/api/addEvents";
pub const DEFAULT_CHECKPOINT_PATH: &str = "checkpoint.json";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Search API base URL (e.g., "https://api.sumologic.com/api")
    pub search_endpoint: String,

    /// Search API access id (basic auth user)
    pub access_id: String,

    /// Search API access key (basic auth password)
    pub access_key: String,

    /// Query text submitted with every search job
    pub query: String,

    /// IANA zone the query's from/to strings are rendered and read in
    pub time_zone: String,

    /// Search by receipt time instead of message time
    pub by_receipt_time: bool,

    /// Delay between two status polls of a search job
    pub poll_interval: Duration,

    /// Number of status polls before a job counts as stalled
    pub max_poll_attempts: u32,

    /// Maximum number of records fetched from a finished job
    pub result_limit: u64,

    /// Full URL of the ingestion endpoint
    pub ingest_endpoint: String,

    /// Bearer token for the ingestion endpoint
    pub ingest_token: String,

    /// Location of the checkpoint file
    pub checkpoint_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            access_id: String::new(),
            access_key: String::new(),
            query: "_sourceCategory=*".to_string(),
            time_zone: "UTC".to_string(),
            by_receipt_time: false,
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: 120, // 10 minutes at the default interval
            result_limit: 100,
            ingest_endpoint: DEFAULT_INGEST_ENDPOINT.to_string(),
            ingest_token: String::new(),
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - SUMO_ACCESS_ID, SUMO_ACCESS_KEY (required for the `sumo` source)
    /// - SUMO_ENDPOINT (optional, default: https://api.sumologic.com/api)
    /// - SUMO_QUERY (optional, default: `_sourceCategory=*`)
    /// - SUMO_TIME_ZONE (optional, default: UTC)
    /// - SUMO_BY_RECEIPT_TIME (optional, default: false)
    /// - SUMO_POLL_DELAY (optional, seconds, default: 5)
    /// - SUMO_MAX_POLL_ATTEMPTS (optional, default: 120)
    /// - SUMO_RESULT_LIMIT (optional, default: 100)
    /// - DATASET_ENDPOINT (optional, default: https://app.scalyr.com/api/addEvents)
    /// - DATASET_TOKEN (required when delivering)
    /// - FERRY_CHECKPOINT_PATH (optional, default: checkpoint.json)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let poll_interval = match var("SUMO_POLL_DELAY") {
            Some(raw) => Duration::from_secs(parse_number("SUMO_POLL_DELAY", &raw)?),
            None => defaults.poll_interval,
        };

        let max_poll_attempts = match var("SUMO_MAX_POLL_ATTEMPTS") {
            Some(raw) => parse_number("SUMO_MAX_POLL_ATTEMPTS", &raw)?,
            None => defaults.max_poll_attempts,
        };

        let result_limit = match var("SUMO_RESULT_LIMIT") {
            Some(raw) => parse_number("SUMO_RESULT_LIMIT", &raw)?,
            None => defaults.result_limit,
        };

        let by_receipt_time = match var("SUMO_BY_RECEIPT_TIME") {
            Some(raw) => parse_bool("SUMO_BY_RECEIPT_TIME", &raw)?,
            None => defaults.by_receipt_time,
        };

        Ok(Self {
            search_endpoint: var("SUMO_ENDPOINT").unwrap_or(defaults.search_endpoint),
            access_id: var("SUMO_ACCESS_ID").unwrap_or_default(),
            access_key: var("SUMO_ACCESS_KEY").unwrap_or_default(),
            query: var("SUMO_QUERY").unwrap_or(defaults.query),
            time_zone: var("SUMO_TIME_ZONE").unwrap_or(defaults.time_zone),
            by_receipt_time,
            poll_interval,
            max_poll_attempts,
            result_limit,
            ingest_endpoint: var("DATASET_ENDPOINT").unwrap_or(defaults.ingest_endpoint),
            ingest_token: var("DATASET_TOKEN").unwrap_or_default(),
            checkpoint_path: var("FERRY_CHECKPOINT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.checkpoint_path),
        })
    }

    /// Validates the configuration for one run
    ///
    /// Credentials are only required for the services the run will talk to.
    pub fn validate_for(&self, source: SourceMode, deliver: bool) -> Result<(), ConfigError> {
        if source == SourceMode::Sumo {
            if self.access_id.is_empty() {
                return Err(ConfigError::Missing("SUMO_ACCESS_ID"));
            }
            if self.access_key.is_empty() {
                return Err(ConfigError::Missing("SUMO_ACCESS_KEY"));
            }
            check_url("SUMO_ENDPOINT", &self.search_endpoint)?;
            parse_time_zone(&self.time_zone)?;

            if self.query.trim().is_empty() {
                return Err(invalid("SUMO_QUERY", "query cannot be empty"));
            }
            if self.poll_interval.is_zero() {
                return Err(invalid("SUMO_POLL_DELAY", "must be greater than 0"));
            }
            if self.max_poll_attempts == 0 {
                return Err(invalid("SUMO_MAX_POLL_ATTEMPTS", "must be greater than 0"));
            }
            if self.result_limit == 0 {
                return Err(invalid("SUMO_RESULT_LIMIT", "must be greater than 0"));
            }
        }

        if deliver {
            if self.ingest_token.is_empty() {
                return Err(ConfigError::Missing("DATASET_TOKEN"));
            }
            check_url("DATASET_ENDPOINT", &self.ingest_endpoint)?;
        }

        if self.checkpoint_path.as_os_str().is_empty() {
            return Err(invalid("FERRY_CHECKPOINT_PATH", "path cannot be empty"));
        }

        Ok(())
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

/// Parses an IANA zone name such as `UTC` or `Asia/Tokyo`
pub fn parse_time_zone(name: &str) -> Result<Tz, ConfigError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| invalid("SUMO_TIME_ZONE", format!("{:?}: {}", name, e)))
}

fn check_url(key: &'static str, url: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(invalid(key, "must start with http:// or https://"));
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| invalid(key, format!("{:?}: {}", raw, e)))
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(invalid(key, format!("expected true or false, got {:?}", other))),
    }
}
