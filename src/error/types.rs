//! Main error type for the request engine.

use std::time::Duration;
use thiserror::Error;
use super::categories::*;
use crate::transport::TransportError;

/// Result type alias for engine operations.
pub type GenAiResult<T> = Result<T, GenAiError>;

/// Top-level error type.
#[derive(Error, Debug, Clone)]
pub enum GenAiError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    /// The configured API key is an ephemeral token and the call path does not accept one.
    #[error("Ephemeral tokens can only be used with the live API")]
    EphemeralTokenMisuse,

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Response error: {0}")]
    Response(#[from] ResponseError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),
}

impl GenAiError {
    /// HTTP status code carried by this error, if the server produced one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GenAiError::Api(e) => Some(e.code),
            _ => None,
        }
    }

    /// True for failures raised before any network attempt.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            GenAiError::Configuration(_) | GenAiError::EphemeralTokenMisuse
        )
    }
}

impl From<TransportError> for GenAiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(duration) => GenAiError::Network(NetworkError::Timeout {
                duration: duration.unwrap_or(Duration::ZERO),
            }),
            TransportError::Connection(message) | TransportError::Request(message) => {
                GenAiError::Network(NetworkError::ConnectionFailed { message })
            }
            TransportError::Body(message) => {
                GenAiError::Response(ResponseError::StreamInterrupted { message })
            }
            TransportError::Build(message) => {
                GenAiError::Network(NetworkError::ClientBuild { message })
            }
        }
    }
}

impl From<serde_json::Error> for GenAiError {
    fn from(err: serde_json::Error) -> Self {
        GenAiError::Response(ResponseError::DeserializationError {
            message: err.to_string(),
        })
    }
}

impl From<url::ParseError> for GenAiError {
    fn from(err: url::ParseError) -> Self {
        GenAiError::Configuration(ConfigurationError::InvalidBaseUrl {
            url: err.to_string(),
        })
    }
}
