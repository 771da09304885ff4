//! Transport layer error types.

use std::time::Duration;

/// Failure to complete one wire exchange.
///
/// Non-2xx responses are not transport errors; they come back as ordinary
/// responses and are classified by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Request timed out")]
    Timeout(Option<Duration>),
    #[error("Request error: {0}")]
    Request(String),
    #[error("Body error: {0}")]
    Body(String),
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}
