//! Reqwest-based HTTP transports (async and blocking).

use super::error::TransportError;
use super::http::{
    AsyncResponse, BlockingHttpTransport, BlockingResponse, BodySource, HttpMethod, HttpRequest,
    HttpResponse, HttpTransport,
};
use super::TransportSettings;
use crate::config::Headers;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::io::BufReader;
use std::time::Duration;

fn convert_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn convert_headers(headers: &Headers) -> Result<reqwest::header::HeaderMap, TransportError> {
    let mut header_map = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (key, value) in headers.iter() {
        let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| TransportError::Request(format!("Invalid header name {key}: {e}")))?;
        let value = reqwest::header::HeaderValue::from_str(value)
            .map_err(|e| TransportError::Request(format!("Invalid value for header {key}: {e}")))?;
        header_map.insert(name, value);
    }
    Ok(header_map)
}

fn extract_headers(headers: &reqwest::header::HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}

fn map_error(e: &reqwest::Error, timeout: Option<Duration>) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else if e.is_connect() {
        TransportError::Connection(e.to_string())
    } else if e.is_body() || e.is_decode() {
        TransportError::Body(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

fn load_root_certificate(settings: &TransportSettings) -> Result<Option<reqwest::Certificate>, TransportError> {
    let Some(path) = &settings.ca_cert_file else {
        return Ok(None);
    };
    let pem = std::fs::read(path)
        .map_err(|e| TransportError::Build(format!("Failed to read CA bundle {}: {e}", path.display())))?;
    reqwest::Certificate::from_pem(&pem)
        .map(Some)
        .map_err(|e| TransportError::Build(format!("Invalid CA bundle {}: {e}", path.display())))
}

fn redirect_policy(settings: &TransportSettings) -> reqwest::redirect::Policy {
    if settings.follow_redirects {
        reqwest::redirect::Policy::default()
    } else {
        reqwest::redirect::Policy::none()
    }
}

/// Async transport backed by `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport from backend settings.
    pub fn new(settings: &TransportSettings) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().redirect(redirect_policy(settings));
        if let Some(connect_timeout) = settings.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(cert) = load_root_certificate(settings)? {
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest, streamed: bool) -> Result<AsyncResponse, TransportError> {
        let timeout = request.timeout;
        let mut req_builder = self
            .client
            .request(convert_method(request.method), &request.url)
            .headers(convert_headers(&request.headers)?);
        if let Some(body) = request.body.to_bytes()? {
            req_builder = req_builder.body(body);
        }
        if let Some(timeout) = timeout {
            req_builder = req_builder.timeout(timeout);
        }

        let response = req_builder.send().await.map_err(|e| map_error(&e, timeout))?;
        let status = response.status().as_u16();
        let headers = extract_headers(response.headers());

        let body = if streamed {
            let stream = response
                .bytes_stream()
                .map_err(move |e| map_error(&e, timeout));
            BodySource::Live(Box::pin(stream) as super::http::ByteStream)
        } else {
            let bytes = response.bytes().await.map_err(|e| map_error(&e, timeout))?;
            BodySource::Buffered(vec![bytes])
        };

        Ok(HttpResponse { status, headers, body })
    }
}

/// Blocking transport backed by `reqwest::blocking::Client`.
///
/// Must not be constructed or used on an async runtime thread.
#[derive(Clone)]
pub struct ReqwestBlockingTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestBlockingTransport {
    /// Creates a transport from backend settings.
    pub fn new(settings: &TransportSettings) -> Result<Self, TransportError> {
        let mut builder = reqwest::blocking::Client::builder()
            .redirect(redirect_policy(settings))
            // The blocking client applies a 30s default otherwise.
            .timeout(None::<Duration>);
        if let Some(connect_timeout) = settings.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(cert) = load_root_certificate(settings)? {
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client })
    }
}

impl BlockingHttpTransport for ReqwestBlockingTransport {
    fn send(&self, request: HttpRequest, streamed: bool) -> Result<BlockingResponse, TransportError> {
        let timeout = request.timeout;
        let mut req_builder = self
            .client
            .request(convert_method(request.method), &request.url)
            .headers(convert_headers(&request.headers)?);
        if let Some(body) = request.body.to_bytes()? {
            req_builder = req_builder.body(body);
        }
        if let Some(timeout) = timeout {
            req_builder = req_builder.timeout(timeout);
        }

        let response = req_builder.send().map_err(|e| map_error(&e, timeout))?;
        let status = response.status().as_u16();
        let headers = extract_headers(response.headers());

        let body = if streamed {
            BodySource::Live(Box::new(BufReader::new(response)) as Box<dyn std::io::BufRead + Send>)
        } else {
            let bytes = response.bytes().map_err(|e| map_error(&e, timeout))?;
            BodySource::Buffered(vec![bytes])
        };

        Ok(HttpResponse { status, headers, body })
    }
}
