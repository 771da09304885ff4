//! Request builder: turns a logical call into a fully-addressed wire request.
//!
//! The builder handles:
//! - merging per-call overrides onto the base options
//! - project/location interpolation for regional endpoints
//! - URL construction with the API version prefix
//! - internal body key stripping and `extra_body` merging
//! - the server timeout hint header
//!
//! Auth headers are not added here; they are injected per attempt by the
//! client so a refreshed token reaches every retry.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::time::Duration;

use super::http::{HttpMethod, HttpRequest, RequestBody};
use crate::config::{populate_server_timeout_header, timeout_in_seconds, HttpOptions};
use crate::error::{ConfigurationError, GenAiError, GenAiResult};

const EPHEMERAL_TOKEN_PREFIX: &str = "auth_tokens/";
const BASE_MODELS_PATH: &str = "publishers/google/models";
const INTERNAL_KEY_PREFIX: char = '_';

/// Which endpoint family a client talks to, and with which identity.
#[derive(Clone, Debug, Default)]
pub struct ApiTarget {
    /// Regional cloud mode.
    pub vertexai: bool,
    /// Cloud project.
    pub project: Option<String>,
    /// Cloud location.
    pub location: Option<String>,
    /// API key, when API-key auth is active.
    pub api_key: Option<SecretString>,
}

impl ApiTarget {
    /// True when the configured key is an ephemeral token.
    pub fn has_ephemeral_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| k.expose_secret().starts_with(EPHEMERAL_TOKEN_PREFIX))
    }

    /// Uses OAuth credentials rather than an API key.
    pub fn uses_oauth(&self) -> bool {
        self.vertexai && self.api_key.is_none()
    }
}

/// A built request together with the options it was built from.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    /// The wire request, without auth headers.
    pub request: HttpRequest,
    /// Effective options for this call.
    pub options: HttpOptions,
}

/// Builder for wire requests.
#[derive(Clone, Debug)]
pub struct RequestBuilder {
    base_options: HttpOptions,
    target: ApiTarget,
}

impl RequestBuilder {
    /// Creates a builder over the client's base options.
    pub fn new(base_options: HttpOptions, target: ApiTarget) -> Self {
        Self {
            base_options,
            target,
        }
    }

    /// Base options held by this builder.
    pub fn base_options(&self) -> &HttpOptions {
        &self.base_options
    }

    /// Endpoint target.
    pub fn target(&self) -> &ApiTarget {
        &self.target
    }

    /// Effective options for a call.
    pub fn effective_options(&self, overrides: Option<&HttpOptions>) -> HttpOptions {
        match overrides {
            Some(patch) => self.base_options.merge(patch),
            None => self.base_options.clone(),
        }
    }

    /// Prefixes `path` with the project/location segment when required.
    pub fn resolve_path(&self, method: HttpMethod, path: &str) -> String {
        let base_models = method == HttpMethod::Get && path.starts_with(BASE_MODELS_PATH);
        if self.target.vertexai
            && !path.starts_with("projects/")
            && !base_models
            && self.target.api_key.is_none()
        {
            format!(
                "projects/{}/locations/{}/{}",
                self.target.project.as_deref().unwrap_or_default(),
                self.target.location.as_deref().unwrap_or_default(),
                path
            )
        } else {
            path.to_string()
        }
    }

    /// Builds a wire request.
    pub fn build(
        &self,
        method: HttpMethod,
        path: &str,
        body: RequestBody,
        overrides: Option<&HttpOptions>,
    ) -> GenAiResult<BuiltRequest> {
        let mut body = body;
        if let RequestBody::Fields(fields) = &mut body {
            fields.retain(|key, _| !key.starts_with(INTERNAL_KEY_PREFIX));
        }

        let options = self.effective_options(overrides);
        let path = self.resolve_path(method, path);
        let versioned_path = match &options.api_version {
            Some(version) => format!("{version}/{path}"),
            None => format!("/{path}"),
        };

        let base_url = options
            .base_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(GenAiError::Configuration(ConfigurationError::MissingBaseUrl))?;

        if let (Some(extra), RequestBody::Fields(fields)) = (&options.extra_body, &mut body) {
            deep_merge(fields, extra);
        }

        let url = join_url_path(base_url, &versioned_path)?;

        if self.target.has_ephemeral_key() {
            return Err(GenAiError::EphemeralTokenMisuse);
        }

        let timeout_secs = timeout_in_seconds(options.timeout);
        let mut headers = options.headers.clone().unwrap_or_default();
        if headers.get_ignore_case("content-type").is_none() {
            headers.insert("Content-Type", "application/json");
        }
        populate_server_timeout_header(&mut headers, timeout_secs);

        Ok(BuiltRequest {
            request: HttpRequest {
                method,
                url,
                headers,
                body,
                timeout: timeout_secs.map(Duration::from_secs_f64),
            },
            options,
        })
    }
}

/// Joins a base URL and a path with exactly one slash between them.
///
/// One trailing slash is dropped from the base path and one leading slash
/// from `path`; any query on the base URL is kept after the joined path.
pub fn join_url_path(base_url: &str, path: &str) -> GenAiResult<String> {
    let parsed = url::Url::parse(base_url).map_err(|_| {
        GenAiError::Configuration(ConfigurationError::InvalidBaseUrl {
            url: base_url.to_string(),
        })
    })?;
    let head = &parsed[..url::Position::AfterPath];
    let tail = &parsed[url::Position::AfterPath..];
    let head = head.strip_suffix('/').unwrap_or(head);
    let path = path.strip_prefix('/').unwrap_or(path);
    Ok(format!("{head}/{path}{tail}"))
}

/// Recursively merges `update` into `target`; nested objects merge, all
/// other values overwrite.
pub fn deep_merge(target: &mut Map<String, Value>, update: &Map<String, Value>) {
    for (key, value) in update {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => deep_merge(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
