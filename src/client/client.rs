//! The request engine client.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use once_cell::sync::OnceCell;
use secrecy::{ExposeSecret, SecretString};
use std::io::Read;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::auth::CredentialManager;
use crate::config::{Headers, HttpOptions, USER_PROJECT_HEADER};
use crate::error::{
    map_http_status_with_body, ConfigurationError, GenAiError, GenAiResult, UploadError,
};
use crate::resilience::{RetryOrchestrator, RetryPolicy};
use crate::streaming::{SegmentStream, Segments};
use crate::transfer::{self, UploadConfig};
use crate::transport::{
    AsyncResponse, BlockingHttpTransport, BlockingResponse, BuiltRequest, HttpMethod, HttpRequest,
    HttpTransport, ReqwestBlockingTransport, RequestBody, RequestBuilder, TransportSettings,
};
use crate::types::ApiResponse;

use super::builder::ApiClientBuilder;

/// Stream of decoded records from an async streamed call.
pub type ApiResponseStream = Pin<Box<dyn Stream<Item = GenAiResult<ApiResponse>> + Send>>;

/// The request engine client.
///
/// Holds the base options, the endpoint target, the credential manager and
/// both transports. Cloning is cheap; clones share credentials and
/// connection pools.
///
/// # Example
///
/// ```no_run
/// use integrations_genai::{ApiClient, HttpMethod};
/// use secrecy::SecretString;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::builder()
///     .api_key(SecretString::new("your-api-key".into()))
///     .build()?;
///
/// let response = client
///     .async_request(HttpMethod::Get, "models/gemini-2.0-flash", serde_json::Map::new(), None)
///     .await?;
/// println!("{}", response.body);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    builder: RequestBuilder,
    credentials: Option<Arc<CredentialManager>>,
    transport: Arc<dyn HttpTransport>,
    blocking_transport: Arc<OnceCell<Arc<dyn BlockingHttpTransport>>>,
    settings: TransportSettings,
    upload_config: UploadConfig,
}

impl ApiClient {
    /// Creates a new client builder.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    pub(super) fn from_parts(
        builder: RequestBuilder,
        credentials: Option<Arc<CredentialManager>>,
        transport: Arc<dyn HttpTransport>,
        blocking_transport: Option<Arc<dyn BlockingHttpTransport>>,
        settings: TransportSettings,
        upload_config: UploadConfig,
    ) -> Self {
        let cell = OnceCell::new();
        if let Some(blocking) = blocking_transport {
            let _ = cell.set(blocking);
        }
        Self {
            builder,
            credentials,
            transport,
            blocking_transport: Arc::new(cell),
            settings,
            upload_config,
        }
    }

    /// Regional cloud mode.
    pub fn vertexai(&self) -> bool {
        self.builder.target().vertexai
    }

    /// Cloud project.
    pub fn project(&self) -> Option<&str> {
        self.builder.target().project.as_deref()
    }

    /// Cloud location.
    pub fn location(&self) -> Option<&str> {
        self.builder.target().location.as_deref()
    }

    /// Active API key.
    pub fn api_key(&self) -> Option<&SecretString> {
        self.builder.target().api_key.as_ref()
    }

    /// Credential manager, when OAuth is in use.
    pub fn credential_manager(&self) -> Option<&Arc<CredentialManager>> {
        self.credentials.as_ref()
    }

    /// A copy of the client's base options.
    pub fn http_options(&self) -> HttpOptions {
        self.builder.base_options().clone()
    }

    /// Base URL with its scheme switched to `wss`, for the live API.
    pub fn websocket_base_url(&self) -> GenAiResult<String> {
        let base = self.builder.base_options().base_url.as_deref().unwrap_or_default();
        let mut url = url::Url::parse(base).map_err(|_| ConfigurationError::InvalidBaseUrl {
            url: base.to_string(),
        })?;
        url.set_scheme("wss").map_err(|()| ConfigurationError::InvalidBaseUrl {
            url: base.to_string(),
        })?;
        Ok(url.to_string())
    }

    fn blocking(&self) -> GenAiResult<&Arc<dyn BlockingHttpTransport>> {
        self.blocking_transport
            .get_or_try_init(|| {
                let transport = ReqwestBlockingTransport::new(&self.settings)?;
                Ok::<_, crate::transport::TransportError>(Arc::new(transport) as Arc<dyn BlockingHttpTransport>)
            })
            .map_err(GenAiError::from)
    }

    fn with_token(&self, headers: &Headers, token: &SecretString) -> Headers {
        let mut headers = headers.clone();
        headers.insert("Authorization", format!("Bearer {}", token.expose_secret()));
        if let Some(quota_project) = self.credentials.as_ref().and_then(|c| c.quota_project_id()) {
            headers.insert(USER_PROJECT_HEADER, quota_project);
        }
        headers
    }

    fn authorize_blocking(&self, request: &HttpRequest) -> GenAiResult<HttpRequest> {
        let mut attempt = request.clone();
        if let Some(manager) = &self.credentials {
            let token = manager.access_token()?;
            attempt.headers = self.with_token(&request.headers, &token);
        }
        Ok(attempt)
    }

    async fn authorize(&self, request: &HttpRequest) -> GenAiResult<HttpRequest> {
        let mut attempt = request.clone();
        if let Some(manager) = &self.credentials {
            let token = manager.async_access_token().await?;
            attempt.headers = self.with_token(&request.headers, &token);
        }
        Ok(attempt)
    }

    fn send_once_blocking(&self, request: &HttpRequest, streamed: bool) -> GenAiResult<BlockingResponse> {
        let attempt = self.authorize_blocking(request)?;
        tracing::debug!(method = %attempt.method, url = %attempt.url, streamed, "Sending request");
        let response = self.blocking()?.send(attempt, streamed)?;
        if response.is_success() {
            return Ok(response);
        }
        let status = response.status;
        let body = response.into_bytes()?;
        Err(map_http_status_with_body(status, &body).into())
    }

    async fn send_once(&self, request: &HttpRequest, streamed: bool) -> GenAiResult<AsyncResponse> {
        let attempt = self.authorize(request).await?;
        tracing::debug!(method = %attempt.method, url = %attempt.url, streamed, "Sending request");
        let response = self.transport.send(attempt, streamed).await?;
        if response.is_success() {
            return Ok(response);
        }
        let status = response.status;
        let body = response.into_bytes().await?;
        Err(map_http_status_with_body(status, &body).into())
    }

    fn execute_blocking(&self, built: &BuiltRequest, streamed: bool) -> GenAiResult<BlockingResponse> {
        let retry = RetryOrchestrator::new(RetryPolicy::from_options(built.options.retry_options.as_ref()));
        retry.execute_blocking(|| self.send_once_blocking(&built.request, streamed))
    }

    async fn execute(&self, built: &BuiltRequest, streamed: bool) -> GenAiResult<AsyncResponse> {
        let retry = RetryOrchestrator::new(RetryPolicy::from_options(built.options.retry_options.as_ref()));
        retry.execute(|| self.send_once(&built.request, streamed)).await
    }

    /// Sends a request and returns headers and body text, blocking the thread.
    pub fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: impl Into<RequestBody>,
        overrides: Option<&HttpOptions>,
    ) -> GenAiResult<ApiResponse> {
        let built = self.builder.build(method, path, body.into(), overrides)?;
        let response = self.execute_blocking(&built, false)?;
        let headers = response.headers.clone();
        let body = response.into_bytes()?;
        Ok(ApiResponse::new(headers, String::from_utf8_lossy(&body).into_owned()))
    }

    /// Sends a streamed request and yields one response per decoded record,
    /// blocking the thread while reading.
    pub fn request_streamed(
        &self,
        method: HttpMethod,
        path: &str,
        body: impl Into<RequestBody>,
        overrides: Option<&HttpOptions>,
    ) -> GenAiResult<StreamedResponses> {
        let built = self.builder.build(method, path, body.into(), overrides)?;
        let response = self.execute_blocking(&built, true)?;
        Ok(StreamedResponses {
            headers: response.headers,
            segments: Segments::new(response.body),
        })
    }

    /// Sends a request and returns headers and body text.
    pub async fn async_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: impl Into<RequestBody>,
        overrides: Option<&HttpOptions>,
    ) -> GenAiResult<ApiResponse> {
        let built = self.builder.build(method, path, body.into(), overrides)?;
        let response = self.execute(&built, false).await?;
        let headers = response.headers.clone();
        let body = response.into_bytes().await?;
        Ok(ApiResponse::new(headers, String::from_utf8_lossy(&body).into_owned()))
    }

    /// Sends a streamed request and returns a stream of decoded records.
    ///
    /// Dropping the stream closes the connection.
    pub async fn async_request_streamed(
        &self,
        method: HttpMethod,
        path: &str,
        body: impl Into<RequestBody>,
        overrides: Option<&HttpOptions>,
    ) -> GenAiResult<ApiResponseStream> {
        let built = self.builder.build(method, path, body.into(), overrides)?;
        let response = self.execute(&built, true).await?;
        let headers = response.headers;
        let records = SegmentStream::new(response.body)
            .map(move |record| record.map(|value| ApiResponse::from_record(headers.clone(), &value)));
        Ok(Box::pin(records))
    }

    fn upload_timeout(&self, overrides: Option<&HttpOptions>) -> Option<u64> {
        overrides
            .and_then(|o| o.timeout)
            .or(self.builder.base_options().timeout)
    }

    /// Uploads a file to a resumable-upload URL, blocking the thread.
    pub fn upload_file(
        &self,
        path: impl AsRef<Path>,
        upload_url: &str,
        upload_size: u64,
        overrides: Option<&HttpOptions>,
    ) -> GenAiResult<ApiResponse> {
        let mut file = std::fs::File::open(path.as_ref()).map_err(|e| UploadError::Source {
            message: format!("{}: {e}", path.as_ref().display()),
        })?;
        self.upload_reader(&mut file, upload_url, upload_size, overrides)
    }

    /// Uploads everything `source` yields to a resumable-upload URL,
    /// blocking the thread.
    pub fn upload_reader<R: Read>(
        &self,
        source: &mut R,
        upload_url: &str,
        upload_size: u64,
        overrides: Option<&HttpOptions>,
    ) -> GenAiResult<ApiResponse> {
        transfer::upload_blocking(
            self.blocking()?.as_ref(),
            &self.upload_config,
            source,
            upload_url,
            upload_size,
            self.upload_timeout(overrides),
        )
    }

    /// Uploads a file to a resumable-upload URL.
    pub async fn async_upload_file(
        &self,
        path: impl AsRef<Path>,
        upload_url: &str,
        upload_size: u64,
        overrides: Option<&HttpOptions>,
    ) -> GenAiResult<ApiResponse> {
        let mut file = tokio::fs::File::open(path.as_ref()).await.map_err(|e| UploadError::Source {
            message: format!("{}: {e}", path.as_ref().display()),
        })?;
        self.async_upload_reader(&mut file, upload_url, upload_size, overrides).await
    }

    /// Uploads everything `source` yields to a resumable-upload URL.
    pub async fn async_upload_reader<R: AsyncRead + Unpin>(
        &self,
        source: &mut R,
        upload_url: &str,
        upload_size: u64,
        overrides: Option<&HttpOptions>,
    ) -> GenAiResult<ApiResponse> {
        transfer::upload(
            self.transport.as_ref(),
            &self.upload_config,
            source,
            upload_url,
            upload_size,
            self.upload_timeout(overrides),
        )
        .await
    }

    /// Downloads the raw bytes at `path`, blocking the thread.
    pub fn download_file(&self, path: &str, overrides: Option<&HttpOptions>) -> GenAiResult<Bytes> {
        let built = self.builder.build(HttpMethod::Get, path, RequestBody::default(), overrides)?;
        let request = self.authorize_blocking(&built.request)?;
        transfer::download_blocking(self.blocking()?.as_ref(), request)
    }

    /// Downloads the raw bytes at `path`.
    pub async fn async_download_file(&self, path: &str, overrides: Option<&HttpOptions>) -> GenAiResult<Bytes> {
        let built = self.builder.build(HttpMethod::Get, path, RequestBody::default(), overrides)?;
        let request = self.authorize(&built.request).await?;
        transfer::download(self.transport.as_ref(), request).await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("vertexai", &self.vertexai())
            .field("project", &self.project())
            .field("location", &self.location())
            .field("api_key", &self.api_key().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// Blocking iterator over the records of a streamed call.
pub struct StreamedResponses {
    headers: Headers,
    segments: Segments,
}

impl StreamedResponses {
    /// Headers of the streamed response.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

impl Iterator for StreamedResponses {
    type Item = GenAiResult<ApiResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.segments.next()?;
        Some(record.map(|value| ApiResponse::from_record(self.headers.clone(), &value)))
    }
}
