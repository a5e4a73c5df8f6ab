//! Repository layer
//!
//! Repositories are thin adapters over the HTTP clients. They give the
//! scheduler and services narrow, trait-based interfaces to the remote
//! services so a run can be driven without a network.

mod ingest;
mod search;

// Re-export traits
pub use ingest::IngestRepository;
pub use search::SearchRepository;

// Re-export implementations
pub use ingest::HttpIngestRepository;
pub use search::HttpSearchRepository;

#[cfg(test)]
pub mod testing;
