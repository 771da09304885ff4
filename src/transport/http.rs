//! Wire-level request and response types and the transport abstractions.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::io::{BufRead, Read};
use std::pin::Pin;
use std::time::Duration;

use super::error::TransportError;
use crate::config::Headers;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Upper-case method name.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload: structured fields encoded as JSON, or raw bytes sent as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Fields(serde_json::Map<String, serde_json::Value>),
    Raw(Bytes),
}

impl Default for RequestBody {
    fn default() -> Self {
        RequestBody::Fields(serde_json::Map::new())
    }
}

impl RequestBody {
    /// Wire bytes for this body. An empty field map sends no body.
    pub fn to_bytes(&self) -> Result<Option<Bytes>, TransportError> {
        match self {
            RequestBody::Fields(fields) if fields.is_empty() => Ok(None),
            RequestBody::Fields(fields) => serde_json::to_vec(fields)
                .map(|v| Some(Bytes::from(v)))
                .map_err(|e| TransportError::Request(format!("Failed to encode body: {e}"))),
            RequestBody::Raw(bytes) => Ok(Some(bytes.clone())),
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for RequestBody {
    fn from(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        RequestBody::Fields(fields)
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Raw(bytes)
    }
}

/// A fully-addressed wire request, owned by one transport invocation.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: Headers,
    /// Request body.
    pub body: RequestBody,
    /// Total request timeout.
    pub timeout: Option<Duration>,
}

/// Where a response body comes from.
pub enum BodySource<L> {
    /// Fully read chunks; each chunk is one record.
    Buffered(Vec<Bytes>),
    /// A live connection the caller must drain or drop.
    Live(L),
    /// No body.
    Empty,
}

impl<L> std::fmt::Debug for BodySource<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodySource::Buffered(chunks) => f.debug_tuple("Buffered").field(&chunks.len()).finish(),
            BodySource::Live(_) => f.write_str("Live"),
            BodySource::Empty => f.write_str("Empty"),
        }
    }
}

/// HTTP response from a transport.
#[derive(Debug)]
pub struct HttpResponse<L> {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, names lower-cased.
    pub headers: Headers,
    /// Response body.
    pub body: BodySource<L>,
}

impl<L> HttpResponse<L> {
    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_ignore_case(name)
    }
}

/// Live body of an async response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Live body of a blocking response.
pub type BlockingBody = Box<dyn BufRead + Send>;

/// Response returned by [`HttpTransport`].
pub type AsyncResponse = HttpResponse<ByteStream>;

/// Response returned by [`BlockingHttpTransport`].
pub type BlockingResponse = HttpResponse<BlockingBody>;

fn concat(chunks: Vec<Bytes>) -> Bytes {
    if chunks.len() == 1 {
        return chunks.into_iter().next().unwrap_or_default();
    }
    let mut buf = BytesMut::new();
    for chunk in chunks {
        buf.extend_from_slice(&chunk);
    }
    buf.freeze()
}

impl AsyncResponse {
    /// Reads the whole body into memory.
    pub async fn into_bytes(self) -> Result<Bytes, TransportError> {
        match self.body {
            BodySource::Buffered(chunks) => Ok(concat(chunks)),
            BodySource::Empty => Ok(Bytes::new()),
            BodySource::Live(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl BlockingResponse {
    /// Reads the whole body into memory.
    pub fn into_bytes(self) -> Result<Bytes, TransportError> {
        match self.body {
            BodySource::Buffered(chunks) => Ok(concat(chunks)),
            BodySource::Empty => Ok(Bytes::new()),
            BodySource::Live(mut reader) => {
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .map_err(|e| TransportError::Body(e.to_string()))?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

/// Async HTTP transport.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request. With `streamed` the body is returned as a live
    /// stream; otherwise it is read fully into a single buffered chunk.
    async fn send(&self, request: HttpRequest, streamed: bool) -> Result<AsyncResponse, TransportError>;
}

/// Blocking HTTP transport.
pub trait BlockingHttpTransport: Send + Sync {
    /// Sends a request, blocking the current thread.
    fn send(&self, request: HttpRequest, streamed: bool) -> Result<BlockingResponse, TransportError>;
}
