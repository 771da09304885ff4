//! Mock implementations for testing.
//!
//! Mock transports queue canned responses and record every request they
//! receive; mock credentials count refreshes so single-flight behavior can
//! be asserted.
//!
//! # Example
//!
//! ```
//! use integrations_genai::mocks::MockHttpTransport;
//! use integrations_genai::config::Headers;
//! use integrations_genai::transport::{HttpMethod, HttpRequest, HttpTransport, RequestBody};
//!
//! # tokio_test::block_on(async {
//! let transport = MockHttpTransport::new();
//! transport.enqueue_json_response(200, r#"{"status": "ok"}"#);
//!
//! let request = HttpRequest {
//!     method: HttpMethod::Get,
//!     url: "https://example.com".to_string(),
//!     headers: Headers::new(),
//!     body: RequestBody::default(),
//!     timeout: None,
//! };
//!
//! let response = transport.send(request, false).await.unwrap();
//! assert_eq!(response.status, 200);
//! transport.verify_request_count(1);
//! # });
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AccessToken, CredentialLoader, Credentials, LoadedCredentials};
use crate::config::Headers;
use crate::error::AuthenticationError;
use crate::transport::{
    AsyncResponse, BlockingHttpTransport, BlockingResponse, BodySource, HttpMethod, HttpRequest,
    HttpResponse, HttpTransport, TransportError,
};

#[derive(Clone)]
struct CannedResponse {
    status: u16,
    headers: Headers,
    chunks: Vec<Bytes>,
}

impl CannedResponse {
    fn joined(&self) -> Bytes {
        self.chunks.concat().into()
    }
}

/// Shared queue and request log behind both mock transports.
#[derive(Default)]
struct MockState {
    responses: Mutex<VecDeque<Result<CannedResponse, TransportError>>>,
    requests: Mutex<Vec<(HttpRequest, bool)>>,
}

impl MockState {
    fn record(&self, request: HttpRequest, streamed: bool) -> Result<CannedResponse, TransportError> {
        self.requests.lock().push((request, streamed));
        self.responses.lock().pop_front().unwrap_or_else(|| {
            Err(TransportError::Connection(
                "No response configured in mock transport".to_string(),
            ))
        })
    }
}

macro_rules! mock_transport_api {
    ($name:ident) => {
        impl $name {
            /// Creates an empty mock.
            pub fn new() -> Self {
                Self {
                    state: Arc::new(MockState::default()),
                }
            }

            /// Enqueues a response with a single-chunk body.
            pub fn enqueue_response(&self, status: u16, headers: Headers, body: &str) {
                self.state.responses.lock().push_back(Ok(CannedResponse {
                    status,
                    headers,
                    chunks: vec![Bytes::from(body.to_string())],
                }));
            }

            /// Enqueues a JSON response.
            pub fn enqueue_json_response(&self, status: u16, body: &str) {
                self.enqueue_response(
                    status,
                    Headers::new().with("content-type", "application/json"),
                    body,
                );
            }

            /// Enqueues a response delivered in several body chunks.
            pub fn enqueue_streaming_response(&self, status: u16, chunks: Vec<&str>) {
                self.state.responses.lock().push_back(Ok(CannedResponse {
                    status,
                    headers: Headers::new(),
                    chunks: chunks.into_iter().map(|c| Bytes::from(c.to_string())).collect(),
                }));
            }

            /// Enqueues a transport failure.
            pub fn enqueue_error(&self, error: TransportError) {
                self.state.responses.lock().push_back(Err(error));
            }

            /// All requests received so far.
            pub fn get_requests(&self) -> Vec<HttpRequest> {
                self.state.requests.lock().iter().map(|(r, _)| r.clone()).collect()
            }

            /// The streamed flag of every request received so far.
            pub fn streamed_flags(&self) -> Vec<bool> {
                self.state.requests.lock().iter().map(|(_, s)| *s).collect()
            }

            /// The most recent request.
            pub fn last_request(&self) -> Option<HttpRequest> {
                self.state.requests.lock().last().map(|(r, _)| r.clone())
            }

            /// Asserts the number of requests received.
            pub fn verify_request_count(&self, expected: usize) {
                let actual = self.state.requests.lock().len();
                assert_eq!(actual, expected, "Expected {} requests, got {}", expected, actual);
            }

            /// Asserts method and URL of the request at `index`.
            pub fn verify_request(&self, index: usize, method: HttpMethod, url_contains: &str) {
                let requests = self.get_requests();
                assert!(index < requests.len(), "No request at index {}", index);
                let request = &requests[index];
                assert_eq!(request.method, method);
                assert!(
                    request.url.contains(url_contains),
                    "Expected URL to contain '{}', got '{}'",
                    url_contains,
                    request.url
                );
            }

            /// Asserts a header value on the request at `index`.
            pub fn verify_header(&self, index: usize, header_name: &str, header_value: &str) {
                let requests = self.get_requests();
                assert!(index < requests.len(), "No request at index {}", index);
                let actual = requests[index].headers.get(header_name);
                assert_eq!(
                    actual,
                    Some(header_value),
                    "Expected header '{}' to be '{}', got {:?}",
                    header_name,
                    header_value,
                    actual
                );
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

/// Mock async transport.
#[derive(Clone)]
pub struct MockHttpTransport {
    state: Arc<MockState>,
}

mock_transport_api!(MockHttpTransport);

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: HttpRequest, streamed: bool) -> Result<AsyncResponse, TransportError> {
        let canned = self.state.record(request, streamed)?;
        let body = if streamed {
            let chunks: Vec<Result<Bytes, TransportError>> = canned.chunks.iter().cloned().map(Ok).collect();
            BodySource::Live(Box::pin(futures::stream::iter(chunks)) as crate::transport::ByteStream)
        } else {
            BodySource::Buffered(vec![canned.joined()])
        };
        Ok(HttpResponse {
            status: canned.status,
            headers: canned.headers,
            body,
        })
    }
}

/// Mock blocking transport.
#[derive(Clone)]
pub struct MockBlockingTransport {
    state: Arc<MockState>,
}

mock_transport_api!(MockBlockingTransport);

impl BlockingHttpTransport for MockBlockingTransport {
    fn send(&self, request: HttpRequest, streamed: bool) -> Result<BlockingResponse, TransportError> {
        let canned = self.state.record(request, streamed)?;
        let body = if streamed {
            BodySource::Live(Box::new(Cursor::new(canned.joined())) as crate::transport::BlockingBody)
        } else {
            BodySource::Buffered(vec![canned.joined()])
        };
        Ok(HttpResponse {
            status: canned.status,
            headers: canned.headers,
            body,
        })
    }
}

/// Mock OAuth credentials that count refreshes.
pub struct MockCredentials {
    token: RwLock<Option<AccessToken>>,
    refresh_count: AtomicUsize,
    refresh_delay: Duration,
    quota_project_id: Option<String>,
    fail_refresh: bool,
}

impl MockCredentials {
    fn with_token(token: Option<AccessToken>) -> Self {
        Self {
            token: RwLock::new(token),
            refresh_count: AtomicUsize::new(0),
            refresh_delay: Duration::ZERO,
            quota_project_id: None,
            fail_refresh: false,
        }
    }

    /// Credentials holding a token valid for an hour.
    pub fn valid(token: &str) -> Self {
        Self::with_token(Some(AccessToken::expiring_in(token, 3600)))
    }

    /// Credentials whose token has already expired.
    pub fn expired() -> Self {
        Self::with_token(Some(AccessToken::expiring_in("expired-token", -60)))
    }

    /// Sleeps inside every refresh.
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Sets the quota project.
    pub fn with_quota_project(mut self, project: &str) -> Self {
        self.quota_project_id = Some(project.to_string());
        self
    }

    /// Makes every refresh fail.
    pub fn failing_refresh(mut self) -> Self {
        self.fail_refresh = true;
        self
    }

    /// Number of refreshes performed.
    pub fn refresh_count(&self) -> usize {
        self.refresh_count.load(Ordering::SeqCst)
    }
}

impl Credentials for MockCredentials {
    fn token(&self) -> Option<AccessToken> {
        self.token.read().clone()
    }

    fn refresh(&self) -> Result<(), AuthenticationError> {
        if !self.refresh_delay.is_zero() {
            std::thread::sleep(self.refresh_delay);
        }
        if self.fail_refresh {
            return Err(AuthenticationError::RefreshFailed {
                message: "mock refresh failure".to_string(),
            });
        }
        let n = self.refresh_count.fetch_add(1, Ordering::SeqCst) + 1;
        *self.token.write() = Some(AccessToken::expiring_in(format!("refreshed-token-{n}"), 3600));
        Ok(())
    }

    fn quota_project_id(&self) -> Option<String> {
        self.quota_project_id.clone()
    }
}

/// Mock credential discovery.
pub struct MockCredentialLoader {
    result: Option<LoadedCredentials>,
    load_count: AtomicUsize,
}

impl MockCredentialLoader {
    /// A loader that always returns `credentials` and `project`.
    pub fn new(credentials: Arc<dyn Credentials>, project: Option<String>) -> Self {
        Self {
            result: Some((credentials, project)),
            load_count: AtomicUsize::new(0),
        }
    }

    /// A loader that finds nothing.
    pub fn failing() -> Self {
        Self {
            result: None,
            load_count: AtomicUsize::new(0),
        }
    }

    /// Number of discovery runs.
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }
}

impl CredentialLoader for MockCredentialLoader {
    fn load(&self, _project: Option<&str>) -> Result<LoadedCredentials, AuthenticationError> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        self.result.clone().ok_or(AuthenticationError::NoCredentials)
    }
}
