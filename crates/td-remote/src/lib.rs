//! # td-remote
//!
//! JSON-over-HTTP implementation of the job and search service interfaces.

pub mod client;
pub mod wire;

pub use client::{HttpServiceClient, DEFAULT_REQUEST_TIMEOUT};
