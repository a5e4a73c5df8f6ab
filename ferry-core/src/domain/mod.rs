//! Core domain types
//!
//! These types are shared between the HTTP clients (wire shapes) and the
//! runner (pipeline state).

pub mod envelope;
pub mod search;
pub mod window;
