//! Ferry Core
//!
//! Core types and abstractions for the Ferry ingestion pipeline.
//!
//! This crate contains:
//! - Domain types: the checkpoint window, search jobs, envelopes and events
//! - DTOs: request/response shapes of the search and ingestion services
//! - Time: timestamp normalization shared by the runner and its tests

pub mod domain;
pub mod dto;
pub mod time;
