//! Data Transfer Objects for the remote services
//!
//! Request and response bodies exchanged with the search service. The
//! ingestion service takes the [`Envelope`](crate::domain::envelope::Envelope)
//! as-is, so it needs no DTO of its own.

pub mod search;
