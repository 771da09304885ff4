//! Credential management for OAuth mode.
//!
//! [`CredentialManager`] resolves credentials lazily through a
//! [`CredentialLoader`], caches the bearer token held by the resolved
//! [`Credentials`], and refreshes it at most once per expiry no matter how
//! many callers race on it.
//!
//! # Locking
//!
//! The blocking path and the async path each have their own lock. Both
//! guard the same credential object, so a client must not drive both paths
//! concurrently without external synchronization.

pub mod adc;

pub use adc::{AdcLoader, OAuthCredentials};

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use secrecy::SecretString;
use std::sync::Arc;

use crate::error::{AuthenticationError, GenAiError, GenAiResult};

/// Tokens within this many seconds of expiry are refreshed.
pub const TOKEN_EXPIRY_BUFFER_SECONDS: i64 = 300;

/// Bearer token with an optional expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// The token string.
    pub token: SecretString,
    /// Expiration time; `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Creates a token.
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            expires_at,
        }
    }

    /// Creates a token that expires `seconds` from now.
    pub fn expiring_in(token: impl Into<String>, seconds: i64) -> Self {
        Self::new(token, Some(Utc::now() + Duration::seconds(seconds)))
    }

    /// True once inside the refresh buffer before expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| {
            Utc::now() >= expires_at - Duration::seconds(TOKEN_EXPIRY_BUFFER_SECONDS)
        })
    }
}

/// A refreshable OAuth credential.
///
/// Implementations use interior mutability: `refresh` replaces the held
/// token in place and may block on network I/O.
pub trait Credentials: Send + Sync {
    /// The currently held token.
    fn token(&self) -> Option<AccessToken>;

    /// Fetches a new token, blocking the current thread.
    fn refresh(&self) -> Result<(), AuthenticationError>;

    /// Billing/quota project to attribute requests to.
    fn quota_project_id(&self) -> Option<String> {
        None
    }

    /// True when there is no usable token.
    fn needs_refresh(&self) -> bool {
        self.token().map_or(true, |t| t.is_expired())
    }
}

/// Credentials and the project they were discovered with.
pub type LoadedCredentials = (Arc<dyn Credentials>, Option<String>);

/// Discovers credentials from the ambient environment.
pub trait CredentialLoader: Send + Sync {
    /// Loads credentials; `project` is the explicitly configured project.
    fn load(&self, project: Option<&str>) -> Result<LoadedCredentials, AuthenticationError>;
}

#[derive(Default)]
struct AuthState {
    credentials: Option<Arc<dyn Credentials>>,
    project: Option<String>,
}

impl AuthState {
    fn store(&mut self, (credentials, project): LoadedCredentials) -> Arc<dyn Credentials> {
        if self.project.is_none() {
            self.project = project;
        }
        self.credentials = Some(credentials.clone());
        credentials
    }
}

/// Owns the OAuth credential of one client.
pub struct CredentialManager {
    state: Arc<RwLock<AuthState>>,
    loader: Arc<dyn CredentialLoader>,
    sync_lock: Mutex<()>,
    // Owned guards travel into the blocking task, so a cancelled caller
    // does not release the lock while a refresh is still running.
    async_lock: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("CredentialManager")
            .field("resolved", &state.credentials.is_some())
            .field("project", &state.project)
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    /// Creates a manager, optionally with already resolved credentials.
    pub fn new(
        credentials: Option<Arc<dyn Credentials>>,
        project: Option<String>,
        loader: Arc<dyn CredentialLoader>,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(AuthState {
                credentials,
                project,
            })),
            loader,
            sync_lock: Mutex::new(()),
            async_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// The configured or discovered project.
    pub fn project(&self) -> Option<String> {
        self.state.read().project.clone()
    }

    /// The resolved credentials, if discovery has run.
    pub fn credentials(&self) -> Option<Arc<dyn Credentials>> {
        self.state.read().credentials.clone()
    }

    /// Quota project of the resolved credentials.
    pub fn quota_project_id(&self) -> Option<String> {
        self.credentials().and_then(|c| c.quota_project_id())
    }

    fn fresh_token(credentials: &Arc<dyn Credentials>) -> Option<SecretString> {
        if credentials.needs_refresh() {
            None
        } else {
            credentials.token().map(|t| t.token)
        }
    }

    fn usable_token(credentials: &Arc<dyn Credentials>) -> GenAiResult<SecretString> {
        credentials
            .token()
            .map(|t| t.token)
            .ok_or(GenAiError::Authentication(AuthenticationError::NoCredentials))
    }

    /// Returns a valid access token, loading and refreshing as needed.
    ///
    /// Blocks the current thread during discovery and refresh.
    pub fn access_token(&self) -> GenAiResult<SecretString> {
        if let Some(token) = self.credentials().as_ref().and_then(Self::fresh_token) {
            return Ok(token);
        }

        let _guard = self.sync_lock.lock();
        let credentials = match self.credentials() {
            Some(credentials) => credentials,
            None => {
                tracing::debug!("Resolving application default credentials");
                let project = self.project();
                let loaded = self.loader.load(project.as_deref())?;
                self.state.write().store(loaded)
            }
        };

        if credentials.needs_refresh() {
            tracing::debug!("Refreshing access token");
            credentials.refresh()?;
        }
        Self::usable_token(&credentials)
    }

    /// Async variant of [`access_token`](Self::access_token).
    ///
    /// Discovery and refresh run on the blocking thread pool so the runtime
    /// is never stalled.
    pub async fn async_access_token(&self) -> GenAiResult<SecretString> {
        if let Some(token) = self.credentials().as_ref().and_then(Self::fresh_token) {
            return Ok(token);
        }

        let credentials = match self.credentials() {
            Some(credentials) => credentials,
            None => {
                let guard = self.async_lock.clone().lock_owned().await;
                match self.credentials() {
                    Some(credentials) => credentials,
                    None => {
                        tracing::debug!("Resolving application default credentials");
                        let loader = self.loader.clone();
                        let state = self.state.clone();
                        let project = self.project();
                        tokio::task::spawn_blocking(move || {
                            let _guard = guard;
                            let loaded = loader.load(project.as_deref())?;
                            Ok::<_, AuthenticationError>(state.write().store(loaded))
                        })
                        .await
                        .map_err(|e| AuthenticationError::RefreshFailed {
                            message: e.to_string(),
                        })??
                    }
                }
            }
        };

        if credentials.needs_refresh() {
            let guard = self.async_lock.clone().lock_owned().await;
            if credentials.needs_refresh() {
                tracing::debug!("Refreshing access token");
                let target = credentials.clone();
                tokio::task::spawn_blocking(move || {
                    let _guard = guard;
                    target.refresh()
                })
                .await
                .map_err(|e| AuthenticationError::RefreshFailed {
                    message: e.to_string(),
                })??;
            }
        }
        Self::usable_token(&credentials)
    }
}
