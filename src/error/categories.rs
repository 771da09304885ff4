//! Error category types for granular error handling.

use std::time::Duration;
use thiserror::Error;

/// Configuration-related errors. Raised at construction or before any request
/// leaves the process; never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Project/location and API key are mutually exclusive in the client initializer")]
    ProjectAndApiKey,

    #[error("Credentials and API key are mutually exclusive in the client initializer")]
    CredentialsAndApiKey,

    #[error(
        "Missing key inputs argument! To use the Google AI API, provide an API key. \
         To use the Google Cloud API, provide vertexai, project and location"
    )]
    MissingApiKey,

    #[error("Project and location or API key must be set when using the Vertex AI API")]
    MissingProjectOrLocation,

    #[error("Base URL must be set")]
    MissingBaseUrl,

    #[error("Invalid base URL: {url}")]
    InvalidBaseUrl { url: String },

    #[error("Invalid http_options: {message}")]
    InvalidHttpOptions { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Authentication-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("Could not resolve API token from the environment")]
    NoCredentials,

    #[error("Could not resolve project using application default credentials")]
    NoProject,

    #[error("Credential refresh failed: {message}")]
    RefreshFailed { message: String },

    #[error("Invalid credentials file {path}: {message}")]
    InvalidCredentialsFile { path: String, message: String },
}

/// Error returned by the API for a non-2xx response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code} {status}. {message}")]
pub struct ApiError {
    /// HTTP status code of the response.
    pub code: u16,
    /// Canonical status string (e.g. `INVALID_ARGUMENT`), when the body carried one.
    pub status: String,
    /// Human-readable message.
    pub message: String,
    /// Raw `details` array from the error body.
    pub details: Vec<serde_json::Value>,
}

impl ApiError {
    /// 4xx responses.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// 5xx responses.
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.code)
    }
}

/// Network-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Failed to build HTTP client: {message}")]
    ClientBuild { message: String },
}

/// Response parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("Failed to deserialize response: {message}")]
    DeserializationError { message: String },

    #[error("Stream interrupted: {message}")]
    StreamInterrupted { message: String },

    #[error("Malformed chunk: {message}")]
    MalformedChunk { message: String },

    #[error("Byte segments are not supported for streaming responses")]
    StreamingBytes,
}

/// Resumable upload errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("All content has been uploaded, but the upload status is not finalized (offset {offset}, size {upload_size})")]
    NotFinalized { offset: u64, upload_size: u64 },

    #[error("Failed to upload file: Upload status is not finalized (status: {status:?})")]
    UnexpectedStatus { status: Option<String> },

    #[error("Failed to read upload source: {message}")]
    Source { message: String },
}
