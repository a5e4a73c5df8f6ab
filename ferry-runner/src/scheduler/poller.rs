//! Search job poller
//!
//! Drives one search job through its lifecycle: submit it for a time window,
//! poll its status at a fixed interval until it reaches a terminal state, fetch
//! the results, and delete the job. Polling is bounded; a job that never
//! settles is deleted and reported as stalled.

use ferry_core::domain::search::{JobState, SearchJob};
use ferry_core::domain::window::TimeWindow;
use ferry_core::dto::search::CreateSearchJob;
use chrono_tz::Tz;
use ferry_core::time::epoch_seconds_to_time_string_in;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError, parse_time_zone};
use crate::error::{PipelineError, Result};
use crate::repository::SearchRepository;

/// Query parameters that stay the same across runs
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub time_zone: String,
    pub by_receipt_time: bool,
}

impl SearchQuery {
    pub fn from_config(config: &Config) -> Self {
        Self {
            text: config.query.clone(),
            time_zone: config.time_zone.clone(),
            by_receipt_time: config.by_receipt_time,
        }
    }

    /// Zone the service reads the query bounds in
    pub fn zone(&self) -> std::result::Result<Tz, ConfigError> {
        parse_time_zone(&self.time_zone)
    }

    /// Builds the job creation request for `window`
    ///
    /// The window bounds are rendered as naive strings in the query's time
    /// zone, so `from`/`to` together with `timeZone` name the window's instants.
    pub fn request_for(&self, window: &TimeWindow) -> Result<CreateSearchJob> {
        let zone = self.zone()?;

        Ok(CreateSearchJob {
            query: self.text.clone(),
            from: epoch_seconds_to_time_string_in(window.start, &zone)?,
            to: epoch_seconds_to_time_string_in(window.end, &zone)?,
            time_zone: self.time_zone.clone(),
            by_receipt_time: self.by_receipt_time,
        })
    }
}

/// How a search job ended
#[derive(Debug)]
pub enum JobOutcome {
    /// The job finished and its records were fetched
    Completed {
        job: SearchJob,
        records: Vec<JsonValue>,
    },
    /// The service cancelled the job; there is nothing to fetch
    Cancelled { job: SearchJob },
}

/// Runs search jobs to completion
pub struct SearchJobController {
    repository: Arc<dyn SearchRepository>,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl SearchJobController {
    pub fn new(
        repository: Arc<dyn SearchRepository>,
        poll_interval: Duration,
        max_poll_attempts: u32,
    ) -> Self {
        Self {
            repository,
            poll_interval,
            max_poll_attempts,
        }
    }

    pub fn from_config(repository: Arc<dyn SearchRepository>, config: &Config) -> Self {
        Self::new(repository, config.poll_interval, config.max_poll_attempts)
    }

    /// Executes one search job over `window`
    ///
    /// # Arguments
    /// * `window` - Time bounds of the search
    /// * `query` - Query text and time interpretation
    /// * `result_limit` - Upper bound on the number of records fetched
    pub async fn execute(
        &self,
        window: &TimeWindow,
        query: &SearchQuery,
        result_limit: u64,
    ) -> Result<JobOutcome> {
        let request = query.request_for(window)?;

        let job_id = self
            .repository
            .submit(&request)
            .await
            .map_err(PipelineError::Search)?;
        let mut job = SearchJob::submitted(job_id, result_limit);

        info!(
            job_id = %job.id,
            from = %request.from,
            to = %request.to,
            "Search job submitted"
        );

        self.wait_for_terminal_state(&mut job).await?;

        if job.state == JobState::Cancelled {
            warn!(job_id = %job.id, "Search job was cancelled by the service");
            self.release(&job).await;
            return Ok(JobOutcome::Cancelled { job });
        }

        let limit = job.effective_limit();
        info!(
            job_id = %job.id,
            state = %job.state,
            message_count = job.message_count,
            limit,
            "Search job finished, fetching messages"
        );

        let fetched = self.repository.messages(&job.id, limit).await;
        self.release(&job).await;
        let records = fetched.map_err(PipelineError::Search)?;

        debug!(job_id = %job.id, fetched = records.len(), "Messages fetched");

        Ok(JobOutcome::Completed { job, records })
    }

    /// Polls until the job is terminal or the poll budget is spent
    async fn wait_for_terminal_state(&self, job: &mut SearchJob) -> Result<()> {
        let mut attempts = 0;

        loop {
            let status = match self.repository.status(&job.id).await {
                Ok(status) => status,
                Err(e) => {
                    self.release(job).await;
                    return Err(PipelineError::Search(e));
                }
            };
            attempts += 1;

            job.observe(status.job_state(), status.message_count);

            for pending in &status.pending_errors {
                warn!(job_id = %job.id, error = %pending, "Search job reported an error");
            }

            if job.state.is_terminal() {
                return Ok(());
            }

            match &job.state {
                JobState::Unknown(state) => {
                    warn!(job_id = %job.id, %state, "Unrecognized search job state, still polling");
                }
                state => {
                    debug!(job_id = %job.id, %state, attempts, "Search job still running");
                }
            }

            if attempts >= self.max_poll_attempts {
                warn!(
                    job_id = %job.id,
                    attempts,
                    "Search job did not finish in time, deleting it"
                );
                self.release(job).await;
                return Err(PipelineError::JobStalled {
                    job_id: job.id.clone(),
                    state: job.state.to_string(),
                    attempts,
                });
            }

            time::sleep(self.poll_interval).await;
        }
    }

    /// Deletes the job on the service side; failures are only logged
    async fn release(&self, job: &SearchJob) {
        match self.repository.delete(&job.id).await {
            Ok(()) => debug!(job_id = %job.id, "Search job deleted"),
            Err(e) if e.is_not_found() => {
                debug!(job_id = %job.id, "Search job already gone");
            }
            Err(e) => warn!(job_id = %job.id, error = %e, "Failed to delete search job"),
        }
    }
}
