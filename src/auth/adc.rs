//! Application default credentials.
//!
//! Discovery order:
//! 1. the file named by `GOOGLE_APPLICATION_CREDENTIALS`
//! 2. the gcloud well-known file under `$CLOUDSDK_CONFIG` or
//!    `~/.config/gcloud`
//!
//! `authorized_user` files refresh through the refresh-token grant and
//! `service_account` files through a signed JWT-bearer assertion.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{AccessToken, CredentialLoader, Credentials, LoadedCredentials};
use crate::config::Environment;
use crate::error::AuthenticationError;

/// Default OAuth token endpoint.
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scope requested for every token.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const WELL_KNOWN_FILE: &str = "application_default_credentials.json";
const JWT_LIFETIME_SECONDS: i64 = 3600;

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default)]
        quota_project_id: Option<String>,
    },
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default)]
        private_key_id: Option<String>,
        #[serde(default)]
        token_uri: Option<String>,
        #[serde(default)]
        project_id: Option<String>,
        #[serde(default)]
        quota_project_id: Option<String>,
    },
}

enum Grant {
    RefreshToken {
        client_id: String,
        client_secret: SecretString,
        refresh_token: SecretString,
    },
    ServiceAccount {
        client_email: String,
        private_key: SecretString,
        private_key_id: Option<String>,
    },
}

/// OAuth credentials loaded from a credentials file.
pub struct OAuthCredentials {
    grant: Grant,
    token_url: String,
    quota_project_id: Option<String>,
    token: RwLock<Option<AccessToken>>,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.grant {
            Grant::RefreshToken { .. } => "authorized_user",
            Grant::ServiceAccount { .. } => "service_account",
        };
        f.debug_struct("OAuthCredentials")
            .field("kind", &kind)
            .field("token_url", &self.token_url)
            .field("quota_project_id", &self.quota_project_id)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

impl OAuthCredentials {
    /// Parses credentials from the JSON contents of a credentials file.
    ///
    /// Returns the credentials and the project named in the file.
    pub fn from_json(json: &str, token_url: Option<&str>) -> Result<(Self, Option<String>), String> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| e.to_string())?;
        let parsed = match file {
            CredentialsFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                quota_project_id,
            } => (
                Self {
                    grant: Grant::RefreshToken {
                        client_id,
                        client_secret: SecretString::new(client_secret),
                        refresh_token: SecretString::new(refresh_token),
                    },
                    token_url: token_url.unwrap_or(TOKEN_URL).to_string(),
                    quota_project_id: quota_project_id.clone(),
                    token: RwLock::new(None),
                },
                quota_project_id,
            ),
            CredentialsFile::ServiceAccount {
                client_email,
                private_key,
                private_key_id,
                token_uri,
                project_id,
                quota_project_id,
            } => (
                Self {
                    grant: Grant::ServiceAccount {
                        client_email,
                        private_key: SecretString::new(private_key),
                        private_key_id,
                    },
                    token_url: token_url
                        .map(str::to_string)
                        .or(token_uri)
                        .unwrap_or_else(|| TOKEN_URL.to_string()),
                    quota_project_id: quota_project_id.clone(),
                    token: RwLock::new(None),
                },
                project_id.or(quota_project_id),
            ),
        };
        Ok(parsed)
    }

    fn create_jwt(
        &self,
        client_email: &str,
        private_key: &SecretString,
        private_key_id: Option<&String>,
    ) -> Result<String, AuthenticationError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: &self.token_url,
            exp: now + JWT_LIFETIME_SECONDS,
            iat: now,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = private_key_id.cloned();

        let key = EncodingKey::from_rsa_pem(private_key.expose_secret().as_bytes()).map_err(|e| {
            AuthenticationError::RefreshFailed {
                message: format!("Invalid private key: {e}"),
            }
        })?;

        encode(&header, &claims, &key).map_err(|e| AuthenticationError::RefreshFailed {
            message: format!("JWT encoding failed: {e}"),
        })
    }

    fn form(&self) -> Result<Vec<(&'static str, String)>, AuthenticationError> {
        match &self.grant {
            Grant::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => Ok(vec![
                ("grant_type", "refresh_token".to_string()),
                ("client_id", client_id.clone()),
                ("client_secret", client_secret.expose_secret().clone()),
                ("refresh_token", refresh_token.expose_secret().clone()),
            ]),
            Grant::ServiceAccount {
                client_email,
                private_key,
                private_key_id,
            } => Ok(vec![
                (
                    "grant_type",
                    "urn:ietf:params:oauth:grant-type:jwt-bearer".to_string(),
                ),
                (
                    "assertion",
                    self.create_jwt(client_email, private_key, private_key_id.as_ref())?,
                ),
            ]),
        }
    }
}

impl Credentials for OAuthCredentials {
    fn token(&self) -> Option<AccessToken> {
        self.token.read().clone()
    }

    fn refresh(&self) -> Result<(), AuthenticationError> {
        let form = self.form()?;
        let refresh_failed = |message: String| AuthenticationError::RefreshFailed { message };

        let response = reqwest::blocking::Client::new()
            .post(&self.token_url)
            .form(&form)
            .send()
            .map_err(|e| refresh_failed(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(refresh_failed(format!(
                "Token exchange failed with status {status}: {text}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .map_err(|e| refresh_failed(format!("Failed to parse response: {e}")))?;
        let token = match parsed.expires_in {
            Some(seconds) => AccessToken::expiring_in(parsed.access_token, seconds),
            None => AccessToken::new(parsed.access_token, None),
        };
        *self.token.write() = Some(token);
        Ok(())
    }

    fn quota_project_id(&self) -> Option<String> {
        self.quota_project_id.clone()
    }
}

/// Loads application default credentials from the environment snapshot.
#[derive(Debug, Clone, Default)]
pub struct AdcLoader {
    env: Environment,
    token_url: Option<String>,
}

impl AdcLoader {
    /// Creates a loader over an environment snapshot.
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            token_url: None,
        }
    }

    /// Overrides the token endpoint.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = Some(token_url.into());
        self
    }

    fn well_known_file(&self) -> Option<PathBuf> {
        let config_dir = self
            .env
            .cloudsdk_config
            .clone()
            .or_else(|| self.env.home.as_ref().map(|h| h.join(".config").join("gcloud")))?;
        Some(config_dir.join(WELL_KNOWN_FILE))
    }

    fn read(&self, path: &Path) -> Result<LoadedCredentials, AuthenticationError> {
        let invalid = |message: String| AuthenticationError::InvalidCredentialsFile {
            path: path.display().to_string(),
            message,
        };
        let json = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let (credentials, project) =
            OAuthCredentials::from_json(&json, self.token_url.as_deref()).map_err(invalid)?;
        Ok((Arc::new(credentials), project))
    }
}

impl CredentialLoader for AdcLoader {
    fn load(&self, project: Option<&str>) -> Result<LoadedCredentials, AuthenticationError> {
        let path = match &self.env.application_credentials {
            Some(explicit) => explicit.clone(),
            None => self
                .well_known_file()
                .filter(|p| p.is_file())
                .ok_or(AuthenticationError::NoCredentials)?,
        };
        tracing::debug!(path = %path.display(), "Loading credentials file");

        let (credentials, discovered) = self.read(&path)?;
        let project = project.map(str::to_string).or(discovered);
        Ok((credentials, project))
    }
}
