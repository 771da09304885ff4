//! Builder for [`ApiClient`].

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::auth::{AdcLoader, CredentialLoader, CredentialManager, Credentials};
use crate::config::{
    append_library_version_headers, vertex_base_url, Environment, Headers, HttpOptions,
    API_KEY_HEADER, GEMINI_API_VERSION, GEMINI_BASE_URL, VERTEX_API_VERSION,
};
use crate::error::{ConfigurationError, GenAiError, GenAiResult};
use crate::transfer::UploadConfig;
use crate::transport::{
    select_async_transport, ApiTarget, BlockingHttpTransport, HttpTransport, RequestBuilder,
    TransportSettings,
};

use super::client::ApiClient;

/// Builder for an [`ApiClient`].
///
/// Unset values are read from the process environment (or from the
/// [`Environment`] given to [`environment`](Self::environment)).
///
/// # Example
///
/// ```no_run
/// use integrations_genai::ApiClientBuilder;
/// use secrecy::SecretString;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClientBuilder::new()
///     .api_key(SecretString::new("your-api-key".into()))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ApiClientBuilder {
    vertexai: Option<bool>,
    api_key: Option<SecretString>,
    credentials: Option<Arc<dyn Credentials>>,
    project: Option<String>,
    location: Option<String>,
    http_options: Option<HttpOptions>,
    environment: Option<Environment>,
    upload_config: Option<UploadConfig>,

    // Injectable dependencies for testing
    transport: Option<Arc<dyn HttpTransport>>,
    blocking_transport: Option<Arc<dyn BlockingHttpTransport>>,
    credential_loader: Option<Arc<dyn CredentialLoader>>,
}

impl ApiClientBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects regional cloud mode. Defaults to `GOOGLE_GENAI_USE_VERTEXAI`.
    pub fn vertexai(mut self, vertexai: bool) -> Self {
        self.vertexai = Some(vertexai);
        self
    }

    /// Sets the API key.
    pub fn api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Sets explicit OAuth credentials.
    pub fn credentials(mut self, credentials: Arc<dyn Credentials>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the cloud project.
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Sets the cloud location.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets client-level HTTP options.
    pub fn http_options(mut self, options: HttpOptions) -> Self {
        self.http_options = Some(options);
        self
    }

    /// Sets client-level HTTP options from an untyped value.
    pub fn http_options_value(self, value: serde_json::Value) -> GenAiResult<Self> {
        Ok(self.http_options(HttpOptions::from_value(value)?))
    }

    /// Uses `environment` instead of the process environment.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Overrides upload chunking.
    pub fn upload_config(mut self, config: UploadConfig) -> Self {
        self.upload_config = Some(config);
        self
    }

    /// Sets a custom async transport (for testing).
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets a custom blocking transport (for testing).
    pub fn blocking_transport(mut self, transport: Arc<dyn BlockingHttpTransport>) -> Self {
        self.blocking_transport = Some(transport);
        self
    }

    /// Sets a custom credential discovery (for testing).
    pub fn credential_loader(mut self, loader: Arc<dyn CredentialLoader>) -> Self {
        self.credential_loader = Some(loader);
        self
    }

    /// Validates the inputs and builds the client.
    ///
    /// In regional mode with neither a project nor an API key, application
    /// default credentials are discovered here.
    pub fn build(self) -> GenAiResult<ApiClient> {
        let env = self.environment.unwrap_or_else(Environment::from_process);
        let vertexai = self.vertexai.unwrap_or_else(|| env.use_vertexai());

        let explicit_key = self
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().trim().to_string())
            .filter(|k| !k.is_empty());

        if (self.project.is_some() || self.location.is_some()) && explicit_key.is_some() {
            return Err(ConfigurationError::ProjectAndApiKey.into());
        }
        if self.credentials.is_some() && explicit_key.is_some() {
            return Err(ConfigurationError::CredentialsAndApiKey.into());
        }

        let env_key = env.api_key().map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
        let mut credentials = self.credentials;
        let mut project = self.project.clone().or_else(|| env.project.clone());
        let mut location = self.location.clone().or_else(|| env.location.clone());
        let mut api_key = explicit_key.clone().or_else(|| env_key.clone());
        let loader: Arc<dyn CredentialLoader> = self
            .credential_loader
            .unwrap_or_else(|| Arc::new(AdcLoader::new(env.clone())));

        let (base_url, api_version) = if vertexai {
            let env_scope = env.project.is_some() || env.location.is_some();
            let explicit_scope = self.project.is_some() || self.location.is_some();
            if credentials.is_some() {
                if api_key.take().is_some() {
                    tracing::info!("Credentials take precedence over the API key from the environment");
                }
            } else if env_scope && explicit_key.is_some() {
                tracing::info!(
                    "The user provided Vertex AI API key will take precedence over the \
                     project/location from the environment variables"
                );
                project = None;
                location = None;
            } else if explicit_scope && env_key.is_some() {
                tracing::info!(
                    "The user provided project/location will take precedence over the \
                     Vertex AI API key from the environment variable"
                );
                api_key = None;
            } else if env_scope && env_key.is_some() {
                tracing::info!(
                    "The project/location from the environment variables will take \
                     precedence over the API key from the environment variables"
                );
                api_key = None;
            }

            if project.is_none() && api_key.is_none() {
                let (loaded, discovered) = loader.load(None)?;
                project = discovered;
                if credentials.is_none() {
                    credentials = Some(loaded);
                }
            }

            let scoped = project.is_some() && location.is_some();
            if !scoped && api_key.is_none() {
                return Err(ConfigurationError::MissingProjectOrLocation.into());
            }
            (vertex_base_url(location.as_deref(), api_key.is_some()), VERTEX_API_VERSION)
        } else {
            if api_key.is_none() {
                return Err(ConfigurationError::MissingApiKey.into());
            }
            (GEMINI_BASE_URL.to_string(), GEMINI_API_VERSION)
        };

        let mut headers = Headers::new().with("Content-Type", "application/json");
        if let Some(key) = &api_key {
            headers.insert(API_KEY_HEADER, key.as_str());
        }
        let mut base_options = HttpOptions {
            base_url: Some(base_url),
            api_version: Some(api_version.to_string()),
            headers: Some(headers),
            ..Default::default()
        };
        match &self.http_options {
            Some(user) => base_options = base_options.merge(user),
            None => {
                if let Some(headers) = base_options.headers.as_mut() {
                    append_library_version_headers(headers);
                }
            }
        }

        let target = ApiTarget {
            vertexai,
            project: project.clone(),
            location: location.clone(),
            api_key: api_key.map(SecretString::new),
        };
        let credential_manager = target
            .uses_oauth()
            .then(|| Arc::new(CredentialManager::new(credentials, project, loader)));

        let settings = TransportSettings::from_client_args(
            base_options.client_args.as_ref(),
            env.ssl_cert_file.clone(),
        );
        let transport = match self.transport {
            Some(transport) => transport,
            None => select_async_transport(&settings).map_err(GenAiError::from)?,
        };

        tracing::debug!(
            vertexai,
            base_url = base_options.base_url.as_deref().unwrap_or_default(),
            "Built API client"
        );

        Ok(ApiClient::from_parts(
            RequestBuilder::new(base_options, target),
            credential_manager,
            transport,
            self.blocking_transport,
            settings,
            self.upload_config.unwrap_or_default(),
        ))
    }
}
