//! # Google GenAI Request Engine
//!
//! Request-execution core shared by the Google Generative AI and Vertex AI
//! APIs: everything between a logical call and the bytes on the wire.
//!
//! ## Features
//!
//! - Endpoint and credential resolution from arguments and environment
//! - Base/per-call option merging with telemetry headers
//! - OAuth token refresh shared safely across threads and tasks
//! - Bounded, status-driven retries with exponential backoff and jitter
//! - Line-delimited streaming responses, blocking and async
//! - Chunked resumable uploads and single-shot downloads
//! - Secure credential handling with `SecretString`
//! - London-School TDD with mock transports and credentials
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_genai::{ApiClient, HttpMethod};
//! use secrecy::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::builder()
//!         .api_key(SecretString::new("your-api-key".into()))
//!         .build()?;
//!
//!     let mut body = serde_json::Map::new();
//!     body.insert("contents".into(), serde_json::json!([{"parts": [{"text": "Hello"}]}]));
//!     let response = client
//!         .async_request(HttpMethod::Post, "models/gemini-2.0-flash:generateContent", body, None)
//!         .await?;
//!     println!("{}", response.body);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - `client` - Client construction and entry points
//! - `config` - HTTP options, headers and environment snapshot
//! - `auth` - OAuth credentials and application default credential discovery
//! - `transport` - Request building and HTTP backends
//! - `resilience` - Retry policy and orchestrator
//! - `streaming` - Response record decoding
//! - `transfer` - Resumable upload and download
//! - `error` - Error types and taxonomy
//! - `types` - Response type returned to callers

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod resilience;
pub mod streaming;
pub mod transfer;
pub mod transport;
pub mod types;

// Development/testing modules - always available for integration tests
pub mod mocks;

// Re-exports for convenience
pub use auth::{AccessToken, AdcLoader, CredentialLoader, CredentialManager, Credentials, OAuthCredentials};
pub use client::{ApiClient, ApiClientBuilder, ApiResponseStream, StreamedResponses};
pub use config::{ClientArgs, Environment, Headers, HttpOptions, RetryOptions};
pub use error::{
    // Main error types
    GenAiError,
    GenAiResult,
    // Error categories
    ApiError,
    AuthenticationError,
    ConfigurationError,
    NetworkError,
    ResponseError,
    UploadError,
};
pub use resilience::{RetryOrchestrator, RetryPolicy};
pub use transfer::UploadConfig;
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, BlockingHttpTransport, RequestBody,
    TransportError,
};
pub use types::ApiResponse;
