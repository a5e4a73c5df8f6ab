//! Checkpoint window domain types

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

/// Time bounds of the next incremental query, in epoch seconds
///
/// This is the value persisted as the checkpoint between runs.
/// Invariant: `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    /// Creates a window, returning `None` if `start > end`
    pub fn new(start: i64, end: i64) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Window covering today from local midnight up to `now`
    pub fn starting_today(now: DateTime<Local>) -> Self {
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
            .map(|dt| dt.timestamp())
            .unwrap_or_else(|| now.timestamp());

        Self {
            start: midnight.min(now.timestamp()),
            end: now.timestamp(),
        }
    }

    /// Checks the `start <= end` invariant
    ///
    /// Windows read back from disk are not guaranteed to hold it.
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Moves the window forward past a processed record
    ///
    /// Only instants strictly after `start` move the window, so `start` never
    /// decreases. `end` becomes `now`, or `instant` if the record claims to be
    /// from the future.
    ///
    /// # Returns
    /// `true` if the window changed
    pub fn advance(&mut self, instant: i64, now: i64) -> bool {
        if instant <= self.start {
            return false;
        }

        self.start = instant;
        self.end = now.max(instant);
        true
    }

    /// Stretches `end` up to `now` so the query covers everything since `start`
    pub fn extend_to(&mut self, now: i64) {
        self.end = self.end.max(now);
    }
}
