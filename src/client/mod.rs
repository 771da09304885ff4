//! Client interface for the request engine.
//!
//! [`ApiClientBuilder`] validates the construction inputs, resolves the
//! endpoint and credentials, and hands back an [`ApiClient`] exposing the
//! blocking and async entry points.

mod builder;
mod client;

// Re-export public API
pub use builder::ApiClientBuilder;
pub use client::{ApiClient, ApiResponseStream, StreamedResponses};
