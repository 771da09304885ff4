//! Streaming-oriented async transport on hyper with a rustls connector.

use super::error::TransportError;
use super::http::{AsyncResponse, BodySource, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use super::TransportSettings;
use crate::config::Headers;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Async transport on `hyper-util`'s pooled client.
///
/// Redirects are not followed. Custom CA bundles are not supported, so
/// [`super::select_async_transport`] falls back to reqwest when one is
/// configured.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
}

impl HyperTransport {
    /// Creates a transport from backend settings.
    pub fn new(settings: &TransportSettings) -> Result<Self, TransportError> {
        if settings.ca_cert_file.is_some() {
            return Err(TransportError::Build(
                "custom CA bundles are not supported by the hyper backend".to_string(),
            ));
        }

        let provider = std::sync::Arc::new(rustls::crypto::ring::default_provider());
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(settings.connect_timeout);
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider)
            .map_err(|e| TransportError::Build(e.to_string()))?
            .https_or_http()
            .enable_all_versions()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build::<_, Full<Bytes>>(https);
        Ok(Self { client })
    }
}

/// Runs `future` against the request deadline shared by the head and body reads.
async fn within<F: std::future::Future>(
    deadline: Option<tokio::time::Instant>,
    timeout: Option<std::time::Duration>,
    future: F,
) -> Result<F::Output, TransportError> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future)
            .await
            .map_err(|_| TransportError::Timeout(timeout)),
        None => Ok(future.await),
    }
}

fn convert_method(method: HttpMethod) -> http::Method {
    match method {
        HttpMethod::Get => http::Method::GET,
        HttpMethod::Post => http::Method::POST,
        HttpMethod::Put => http::Method::PUT,
        HttpMethod::Patch => http::Method::PATCH,
        HttpMethod::Delete => http::Method::DELETE,
    }
}

fn extract_headers(headers: &http::HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}

#[async_trait]
impl HttpTransport for HyperTransport {
    async fn send(&self, request: HttpRequest, streamed: bool) -> Result<AsyncResponse, TransportError> {
        let timeout = request.timeout;
        let mut builder = http::Request::builder()
            .method(convert_method(request.method))
            .uri(&request.url);
        for (key, value) in request.headers.iter() {
            builder = builder.header(key, value);
        }
        let body = request.body.to_bytes()?.unwrap_or_default();
        let wire = builder
            .body(Full::new(body))
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let deadline = timeout.map(|limit| tokio::time::Instant::now() + limit);
        let response = within(deadline, timeout, self.client.request(wire))
            .await?
            .map_err(|e| {
                if e.is_connect() {
                    TransportError::Connection(e.to_string())
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let headers = extract_headers(response.headers());
        let incoming = response.into_body();

        let body = if streamed {
            let stream = futures::stream::unfold(Some(incoming), move |state| async move {
                let mut body = state?;
                loop {
                    let frame = match within(deadline, timeout, body.frame()).await {
                        Ok(frame) => frame,
                        Err(e) => return Some((Err(e), None)),
                    };
                    match frame {
                        None => return None,
                        Some(Err(e)) => return Some((Err(TransportError::Body(e.to_string())), None)),
                        Some(Ok(frame)) => {
                            if let Ok(data) = frame.into_data() {
                                return Some((Ok(data), Some(body)));
                            }
                        }
                    }
                }
            });
            BodySource::Live(Box::pin(stream) as super::http::ByteStream)
        } else {
            let collected = within(deadline, timeout, incoming.collect())
                .await?
                .map_err(|e| TransportError::Body(e.to_string()))?;
            BodySource::Buffered(vec![collected.to_bytes()])
        };

        Ok(HttpResponse { status, headers, body })
    }
}
