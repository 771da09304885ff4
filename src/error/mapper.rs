//! Default mapping from non-2xx HTTP responses to [`ApiError`].
//!
//! Domain-specific classification lives in higher layers; this mapper only
//! pulls the structured `{"error": {...}}` envelope out of the body so the
//! status code and message reach the caller intact.

use serde::Deserialize;
use super::categories::ApiError;
use super::types::GenAiError;

/// Structured API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

/// Detailed error information from the API.
#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

/// Maps a status code and raw body to an [`ApiError`].
///
/// The status code of the HTTP exchange always wins over the `code` field in
/// the body so retry decisions see what the server actually sent.
pub fn map_http_status_with_body(status: u16, body: &[u8]) -> ApiError {
    match serde_json::from_slice::<ApiErrorResponse>(body) {
        Ok(parsed) => ApiError {
            code: status,
            status: if parsed.error.status.is_empty() {
                canonical_reason(status).to_string()
            } else {
                parsed.error.status
            },
            message: parsed.error.message,
            details: parsed.error.details,
        },
        Err(_) => ApiError {
            code: status,
            status: canonical_reason(status).to_string(),
            message: String::from_utf8_lossy(body).into_owned(),
            details: Vec::new(),
        },
    }
}

/// Returns `Ok(())` for 2xx statuses, otherwise the mapped API error.
pub fn raise_for_status(status: u16, body: &[u8]) -> Result<(), GenAiError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(GenAiError::Api(map_http_status_with_body(status, body)))
    }
}

fn canonical_reason(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        409 => "Conflict",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_error_body() {
        let body = br#"{"error":{"code":400,"message":"Invalid argument","status":"INVALID_ARGUMENT","details":[{"@type":"x"}]}}"#;
        let error = map_http_status_with_body(400, body);

        assert_eq!(error.code, 400);
        assert_eq!(error.status, "INVALID_ARGUMENT");
        assert_eq!(error.message, "Invalid argument");
        assert_eq!(error.details.len(), 1);
        assert!(error.is_client_error());
    }

    #[test]
    fn test_plain_text_body() {
        let error = map_http_status_with_body(503, b"upstream connect error");

        assert_eq!(error.code, 503);
        assert_eq!(error.status, "Service Unavailable");
        assert_eq!(error.message, "upstream connect error");
        assert!(error.is_server_error());
    }

    #[test]
    fn test_http_status_wins_over_body_code() {
        let body = br#"{"error":{"code":200,"message":"odd"}}"#;
        assert_eq!(map_http_status_with_body(500, body).code, 500);
    }

    #[test]
    fn test_raise_for_status() {
        assert!(raise_for_status(200, b"{}").is_ok());
        assert!(raise_for_status(204, b"").is_ok());
        let err = raise_for_status(429, b"{}").unwrap_err();
        assert_eq!(err.status_code(), Some(429));
    }
}
