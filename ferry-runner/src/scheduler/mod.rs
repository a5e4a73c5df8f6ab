//! Scheduler layer for the runner
//!
//! This layer owns the search job lifecycle: submission, bounded status
//! polling, result retrieval and clean-up on the service side.

pub mod poller;

pub use poller::{JobOutcome, SearchJobController, SearchQuery};
