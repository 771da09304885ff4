//! Response type handed back to higher-level callers.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::Headers;
use crate::error::GenAiResult;

/// Headers and body text of a completed call, or of one streamed record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiResponse {
    /// Response headers.
    pub headers: Headers,
    /// Body text; for streamed calls, one re-serialized record.
    pub body: String,
}

impl ApiResponse {
    /// Creates a response.
    pub fn new(headers: Headers, body: impl Into<String>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// Creates a response from a decoded stream record.
    pub fn from_record(headers: Headers, record: &Value) -> Self {
        Self {
            headers,
            body: record.to_string(),
        }
    }

    /// Parses the body as JSON. An empty body parses as an empty object.
    pub fn json<T: DeserializeOwned>(&self) -> GenAiResult<T> {
        if self.body.is_empty() {
            return Ok(serde_json::from_value(Value::Object(serde_json::Map::new()))?);
        }
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Header value by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_ignore_case(name)
    }
}
