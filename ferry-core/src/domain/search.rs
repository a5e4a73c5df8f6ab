//! Search job domain types

use serde::{Deserialize, Serialize};

/// Lifecycle state of a remote search job, as reported by the search service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    NotStarted,
    GatheringResults,
    GatheringSubqueries,
    /// Stopped by the service at its result cap; the partial results are final
    ForcePaused,
    Done,
    Cancelled,
    /// A state string this client does not know about
    Unknown(String),
}

impl JobState {
    /// Maps the service's state string onto a [`JobState`]
    pub fn from_remote(state: &str) -> Self {
        match state.trim() {
            "NOT STARTED" => JobState::NotStarted,
            "GATHERING RESULTS" => JobState::GatheringResults,
            "GATHERING RESULTS FROM SUBQUERIES" => JobState::GatheringSubqueries,
            "FORCE PAUSED" => JobState::ForcePaused,
            "DONE GATHERING RESULTS" => JobState::Done,
            "CANCELLED" => JobState::Cancelled,
            other => JobState::Unknown(other.to_string()),
        }
    }

    /// Results can be fetched in this state
    pub fn has_results(&self) -> bool {
        matches!(self, JobState::Done | JobState::ForcePaused)
    }

    /// The job will not change state any more
    pub fn is_terminal(&self) -> bool {
        self.has_results() || matches!(self, JobState::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::NotStarted => write!(f, "NOT STARTED"),
            JobState::GatheringResults => write!(f, "GATHERING RESULTS"),
            JobState::GatheringSubqueries => write!(f, "GATHERING RESULTS FROM SUBQUERIES"),
            JobState::ForcePaused => write!(f, "FORCE PAUSED"),
            JobState::Done => write!(f, "DONE GATHERING RESULTS"),
            JobState::Cancelled => write!(f, "CANCELLED"),
            JobState::Unknown(state) => write!(f, "{}", state),
        }
    }
}

/// One execution of a time-bounded query against the search service
///
/// Lives only for the duration of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchJob {
    pub id: String,
    pub state: JobState,
    /// Message count last reported by the service
    pub message_count: u64,
    /// Maximum number of records the run is willing to fetch
    pub result_limit: u64,
}

impl SearchJob {
    /// Creates a freshly submitted job
    pub fn submitted(id: impl Into<String>, result_limit: u64) -> Self {
        Self {
            id: id.into(),
            state: JobState::NotStarted,
            message_count: 0,
            result_limit,
        }
    }

    /// Records the outcome of a status poll
    pub fn observe(&mut self, state: JobState, message_count: u64) {
        self.state = state;
        self.message_count = message_count;
    }

    /// Number of records to request once the job is done
    pub fn effective_limit(&self) -> u64 {
        effective_limit(self.message_count, self.result_limit)
    }
}

/// Picks how many records to fetch for a finished job
///
/// The reported count wins only when it is strictly between zero and the
/// configured limit. A count of zero falls back to the limit: the status can
/// lag behind the result set, and asking for zero records returns nothing.
pub fn effective_limit(reported_count: u64, result_limit: u64) -> u64 {
    if reported_count > 0 && reported_count < result_limit {
        reported_count
    } else {
        result_limit
    }
}
