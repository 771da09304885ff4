//! Merging of base options with per-call overrides.

use super::{Headers, HttpOptions, SERVER_TIMEOUT_HEADER};

const LIBRARY_LABEL: &str = concat!("google-genai-sdk/", env!("CARGO_PKG_VERSION"));
const LANGUAGE_LABEL: &str = "gl-rust";
const TELEMETRY_HEADERS: [&str; 2] = ["user-agent", "x-goog-api-client"];

/// The client identification token appended to telemetry headers.
pub fn version_header_value() -> String {
    format!("{LIBRARY_LABEL} {LANGUAGE_LABEL}")
}

/// Prepends the client identification token to `user-agent` and
/// `x-goog-api-client`, or sets them when absent. Idempotent.
pub fn append_library_version_headers(headers: &mut Headers) {
    let token = version_header_value();
    for name in TELEMETRY_HEADERS {
        let updated = match headers.get(name) {
            Some(existing) if existing.contains(&token) => continue,
            Some(existing) => format!("{token} {existing}"),
            None => token.clone(),
        };
        headers.insert(name, updated);
    }
}

/// Sets `X-Server-Timeout` to the ceiling of `timeout_secs` unless the header
/// is already present.
pub fn populate_server_timeout_header(headers: &mut Headers, timeout_secs: Option<f64>) {
    if let Some(secs) = timeout_secs.filter(|s| *s > 0.0) {
        if !headers.contains_key(SERVER_TIMEOUT_HEADER) {
            // Timeouts are bounded well below u64::MAX seconds.
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let ceiled = secs.ceil() as u64;
            headers.insert(SERVER_TIMEOUT_HEADER, ceiled.to_string());
        }
    }
}

/// Converts a millisecond timeout to seconds. Zero counts as unset.
pub fn timeout_in_seconds(timeout_ms: Option<u64>) -> Option<f64> {
    #[allow(clippy::cast_precision_loss)]
    timeout_ms.filter(|t| *t > 0).map(|t| t as f64 / 1000.0)
}

impl HttpOptions {
    /// Overlays `patch` on `self`.
    ///
    /// Headers merge key by key with the patch winning; every other field is
    /// taken from the patch when set and inherited otherwise. The telemetry
    /// token is appended to the merged headers.
    #[must_use]
    pub fn merge(&self, patch: &HttpOptions) -> HttpOptions {
        let mut headers = self.headers.clone().unwrap_or_default();
        if let Some(patch_headers) = &patch.headers {
            headers.extend_from(patch_headers);
        }
        append_library_version_headers(&mut headers);

        HttpOptions {
            base_url: patch.base_url.clone().or_else(|| self.base_url.clone()),
            api_version: patch.api_version.clone().or_else(|| self.api_version.clone()),
            headers: Some(headers),
            timeout: patch.timeout.or(self.timeout),
            retry_options: patch
                .retry_options
                .clone()
                .or_else(|| self.retry_options.clone()),
            extra_body: patch.extra_body.clone().or_else(|| self.extra_body.clone()),
            client_args: patch.client_args.clone().or_else(|| self.client_args.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_merge_headers_override_wins_per_key() {
        let base = HttpOptions {
            headers: Some(headers(&[("a", "1"), ("b", "2")])),
            ..Default::default()
        };
        let patch = HttpOptions {
            headers: Some(headers(&[("b", "3"), ("c", "4")])),
            ..Default::default()
        };

        let merged = base.merge(&patch).headers.unwrap();
        assert_eq!(merged.get("a"), Some("1"));
        assert_eq!(merged.get("b"), Some("3"));
        assert_eq!(merged.get("c"), Some("4"));
    }

    #[test]
    fn test_merge_scalar_fields_per_field() {
        let base = HttpOptions {
            base_url: Some("https://base/".to_string()),
            api_version: Some("v1".to_string()),
            timeout: Some(1000),
            ..Default::default()
        };
        let patch = HttpOptions {
            api_version: Some("v2".to_string()),
            ..Default::default()
        };

        let merged = base.merge(&patch);
        assert_eq!(merged.base_url.as_deref(), Some("https://base/"));
        assert_eq!(merged.api_version.as_deref(), Some("v2"));
        assert_eq!(merged.timeout, Some(1000));
    }

    #[test]
    fn test_version_headers_idempotent() {
        let mut h = headers(&[("user-agent", "my-app/1.0")]);
        append_library_version_headers(&mut h);
        append_library_version_headers(&mut h);

        let token = version_header_value();
        assert_eq!(h.get("user-agent").unwrap(), format!("{token} my-app/1.0"));
        assert_eq!(h.get("x-goog-api-client").unwrap(), token);
    }

    #[test]
    fn test_server_timeout_header() {
        let mut h = Headers::new();
        populate_server_timeout_header(&mut h, Some(1.2));
        assert_eq!(h.get(SERVER_TIMEOUT_HEADER), Some("2"));

        let mut preset = headers(&[(SERVER_TIMEOUT_HEADER, "99")]);
        populate_server_timeout_header(&mut preset, Some(1.2));
        assert_eq!(preset.get(SERVER_TIMEOUT_HEADER), Some("99"));

        let mut none = Headers::new();
        populate_server_timeout_header(&mut none, None);
        assert!(none.is_empty());
    }

    #[test]
    fn test_timeout_in_seconds() {
        assert_eq!(timeout_in_seconds(Some(1500)), Some(1.5));
        assert_eq!(timeout_in_seconds(Some(0)), None);
        assert_eq!(timeout_in_seconds(None), None);
    }
}
