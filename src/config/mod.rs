//! Configuration types for the request engine.
//!
//! [`HttpOptions`] is both the process-held base configuration of a client
//! and the shape of a per-call override; [`HttpOptions::merge`] produces the
//! effective configuration for one call.

mod merge;

pub use merge::{
    append_library_version_headers, populate_server_timeout_header, timeout_in_seconds,
    version_header_value,
};

use indexmap::IndexMap;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigurationError, GenAiError};

/// Public Gemini API endpoint.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/";

/// API version used against the public endpoint.
pub const GEMINI_API_VERSION: &str = "v1beta";

/// API version used against the regional cloud endpoint.
pub const VERTEX_API_VERSION: &str = "v1beta1";

/// Regional cloud service name.
pub const VERTEX_SERVICE: &str = "aiplatform";

/// Regional cloud domain.
pub const VERTEX_DOMAIN: &str = "googleapis.com";

/// Location that selects the global (non-regional) endpoint.
pub const GLOBAL_LOCATION: &str = "global";

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// Header carrying the billing/quota project in OAuth mode.
pub const USER_PROJECT_HEADER: &str = "x-goog-user-project";

/// Server-side timeout hint header.
pub const SERVER_TIMEOUT_HEADER: &str = "X-Server-Timeout";

/// Builds the regional cloud base URL.
///
/// The global form is used when `location` is `global` or when an API key
/// is in use (express mode).
pub fn vertex_base_url(location: Option<&str>, api_key_present: bool) -> String {
    match location {
        Some(location) if !api_key_present && location != GLOBAL_LOCATION => {
            format!("https://{location}-{VERTEX_SERVICE}.{VERTEX_DOMAIN}/")
        }
        _ => format!("https://{VERTEX_SERVICE}.{VERTEX_DOMAIN}/"),
    }
}

/// Header mapping that preserves insertion order.
///
/// Replacing a value keeps the key's original position. Keys are compared exactly, so `user-agent` and `User-Agent` are distinct
/// entries, mirroring how a plain string map behaves on the wire layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(IndexMap<String, String>);

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Inserts a header, replacing the value in place if the key exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the value for an exact key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the value for a key, ignoring ASCII case.
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// True if the exact key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.shift_remove(key)
    }

    /// Overlays `other` on top of `self`, key by key.
    pub fn extend_from(&mut self, other: &Headers) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no headers are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (key, value) in iter {
            headers.insert(key, value);
        }
        headers
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = Headers;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of header names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Headers, A::Error> {
                let mut headers = Headers::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    headers.insert(key, value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}

/// Retry options as supplied by the caller. Unset fields fall back to the
/// defaults in [`crate::resilience::RetryPolicy`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryOptions {
    /// Total attempts including the first one.
    pub attempts: Option<u32>,
    /// Initial delay in seconds.
    pub initial_delay: Option<f64>,
    /// Maximum delay in seconds.
    pub max_delay: Option<f64>,
    /// Exponential base.
    pub exp_base: Option<f64>,
    /// Jitter fraction applied to each delay.
    pub jitter: Option<f64>,
    /// Status codes that trigger a retry.
    pub http_status_codes: Option<Vec<u16>>,
}

/// Backend construction arguments.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientArgs {
    /// Connect timeout in milliseconds.
    pub connect_timeout: Option<u64>,
    /// PEM bundle added to the trusted roots.
    pub ca_cert_file: Option<PathBuf>,
    /// Follow redirects (defaults to true).
    pub follow_redirects: Option<bool>,
}

impl ClientArgs {
    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.map(Duration::from_millis)
    }
}

/// HTTP options: base configuration and per-call override share this shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpOptions {
    /// Base URL of the endpoint.
    pub base_url: Option<String>,
    /// API version segment; when unset the path is used unversioned.
    pub api_version: Option<String>,
    /// Extra headers, merged key by key.
    pub headers: Option<Headers>,
    /// Request timeout in milliseconds.
    pub timeout: Option<u64>,
    /// Retry policy; `None` means never retry.
    pub retry_options: Option<RetryOptions>,
    /// Fields deep-merged into every request body.
    pub extra_body: Option<serde_json::Map<String, serde_json::Value>>,
    /// Backend construction arguments.
    pub client_args: Option<ClientArgs>,
}

impl HttpOptions {
    /// Validates an untyped options value.
    ///
    /// Unknown keys or mistyped values fail with
    /// [`ConfigurationError::InvalidHttpOptions`].
    pub fn from_value(value: serde_json::Value) -> Result<Self, GenAiError> {
        serde_json::from_value(value).map_err(|e| {
            GenAiError::Configuration(ConfigurationError::InvalidHttpOptions {
                message: e.to_string(),
            })
        })
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the API version.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Headers::new).insert(key, value);
        self
    }

    /// Sets the timeout in milliseconds.
    pub fn with_timeout_ms(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry options.
    pub fn with_retry_options(mut self, retry_options: RetryOptions) -> Self {
        self.retry_options = Some(retry_options);
        self
    }

    /// Sets the extra body fields.
    pub fn with_extra_body(mut self, extra_body: serde_json::Map<String, serde_json::Value>) -> Self {
        self.extra_body = Some(extra_body);
        self
    }

    /// Sets backend construction arguments.
    pub fn with_client_args(mut self, client_args: ClientArgs) -> Self {
        self.client_args = Some(client_args);
        self
    }
}

/// Snapshot of the environment variables the engine consults.
///
/// Captured once at client construction; tests inject their own snapshot
/// instead of mutating the process environment.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    /// `GOOGLE_API_KEY`
    pub google_api_key: Option<String>,
    /// `GEMINI_API_KEY`
    pub gemini_api_key: Option<String>,
    /// `GOOGLE_CLOUD_PROJECT`
    pub project: Option<String>,
    /// `GOOGLE_CLOUD_LOCATION`
    pub location: Option<String>,
    /// `GOOGLE_GENAI_USE_VERTEXAI`
    pub use_vertexai: Option<String>,
    /// `GOOGLE_APPLICATION_CREDENTIALS`
    pub application_credentials: Option<PathBuf>,
    /// `SSL_CERT_FILE`
    pub ssl_cert_file: Option<PathBuf>,
    /// `CLOUDSDK_CONFIG`
    pub cloudsdk_config: Option<PathBuf>,
    /// `HOME`
    pub home: Option<PathBuf>,
}

impl Environment {
    /// Reads the process environment. Empty values count as unset.
    pub fn from_process() -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }

        Self {
            google_api_key: var("GOOGLE_API_KEY"),
            gemini_api_key: var("GEMINI_API_KEY"),
            project: var("GOOGLE_CLOUD_PROJECT"),
            location: var("GOOGLE_CLOUD_LOCATION"),
            use_vertexai: var("GOOGLE_GENAI_USE_VERTEXAI"),
            application_credentials: var("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
            ssl_cert_file: var("SSL_CERT_FILE").map(PathBuf::from),
            cloudsdk_config: var("CLOUDSDK_CONFIG").map(PathBuf::from),
            home: var("HOME").map(PathBuf::from),
        }
    }

    /// API key from the environment. `GOOGLE_API_KEY` takes precedence.
    pub fn api_key(&self) -> Option<String> {
        let google = self.google_api_key.as_deref().filter(|k| !k.is_empty());
        let gemini = self.gemini_api_key.as_deref().filter(|k| !k.is_empty());
        if google.is_some() && gemini.is_some() {
            tracing::warn!("Both GOOGLE_API_KEY and GEMINI_API_KEY are set. Using GOOGLE_API_KEY.");
        }
        google.or(gemini).map(str::to_string)
    }

    /// Whether `GOOGLE_GENAI_USE_VERTEXAI` asks for regional mode.
    pub fn use_vertexai(&self) -> bool {
        self.use_vertexai
            .as_deref()
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vertex_base_url() {
        assert_eq!(
            vertex_base_url(Some("us-central1"), false),
            "https://us-central1-aiplatform.googleapis.com/"
        );
        assert_eq!(
            vertex_base_url(Some("global"), false),
            "https://aiplatform.googleapis.com/"
        );
        assert_eq!(
            vertex_base_url(Some("us-central1"), true),
            "https://aiplatform.googleapis.com/"
        );
    }

    #[test]
    fn test_headers_preserve_insertion_order() {
        let mut headers = Headers::new();
        headers.insert("b", "1");
        headers.insert("a", "2");
        headers.insert("b", "3");

        let keys: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(headers.get("b"), Some("3"));
        assert_eq!(headers.get_ignore_case("B"), Some("3"));
    }

    #[test]
    fn test_headers_deserialize_in_order() {
        let headers: Headers = serde_json::from_value(json!({"z": "1", "a": "2"})).unwrap();
        let keys: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_from_value_keeps_header_and_extra_body_order() {
        let options = HttpOptions::from_value(json!({
            "headers": {"z-first": "1", "a-second": "2"},
            "extra_body": {"zeta": 1, "alpha": 2}
        }))
        .unwrap();

        let headers = options.headers.unwrap();
        let keys: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z-first", "a-second"]);
        let body_keys: Vec<_> = options.extra_body.unwrap().keys().cloned().collect();
        assert_eq!(body_keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_replaced_header_keeps_position() {
        let mut headers = Headers::new().with("a", "1").with("b", "2");
        headers.insert("a", "3");
        let entries: Vec<_> = headers.iter().collect();
        assert_eq!(entries, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_http_options_from_value() {
        let options = HttpOptions::from_value(json!({
            "base_url": "https://example.com/",
            "timeout": 5000,
            "headers": {"x-custom": "1"}
        }))
        .unwrap();
        assert_eq!(options.base_url.as_deref(), Some("https://example.com/"));
        assert_eq!(options.timeout, Some(5000));
    }

    #[test]
    fn test_http_options_rejects_unknown_fields() {
        let result = HttpOptions::from_value(json!({"base_urll": "https://example.com/"}));
        assert!(matches!(
            result,
            Err(GenAiError::Configuration(ConfigurationError::InvalidHttpOptions { .. }))
        ));
    }

    #[test]
    fn test_env_api_key_precedence() {
        let env = Environment {
            google_api_key: Some("google".to_string()),
            gemini_api_key: Some("gemini".to_string()),
            ..Default::default()
        };
        assert_eq!(env.api_key().as_deref(), Some("google"));

        let env = Environment {
            gemini_api_key: Some("gemini".to_string()),
            ..Default::default()
        };
        assert_eq!(env.api_key().as_deref(), Some("gemini"));
    }

    #[test]
    fn test_use_vertexai_flag() {
        let env = Environment {
            use_vertexai: Some("TRUE".to_string()),
            ..Default::default()
        };
        assert!(env.use_vertexai());
        assert!(!Environment::default().use_vertexai());
    }
}
