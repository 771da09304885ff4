//! HTTP transport layer.
//!
//! Two async backends implement [`HttpTransport`]: [`ReqwestTransport`] is
//! always available, and `HyperTransport` is compiled with the
//! `hyper-transport` feature. [`select_async_transport`] prefers hyper when
//! it can be constructed and falls back to reqwest otherwise. The blocking
//! path always uses [`ReqwestBlockingTransport`].

mod error;
mod http;
#[cfg(feature = "hyper-transport")]
mod hyper;
mod request;
mod reqwest;

pub use error::TransportError;
pub use http::{
    AsyncResponse, BlockingBody, BlockingHttpTransport, BlockingResponse, BodySource, ByteStream,
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, RequestBody,
};
#[cfg(feature = "hyper-transport")]
pub use hyper::HyperTransport;
pub use request::{deep_merge, join_url_path, ApiTarget, BuiltRequest, RequestBuilder};
pub use reqwest::{ReqwestBlockingTransport, ReqwestTransport};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientArgs;

/// Backend construction settings shared by every transport.
#[derive(Clone, Debug)]
pub struct TransportSettings {
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// PEM bundle added to trusted roots.
    pub ca_cert_file: Option<PathBuf>,
    /// Follow redirects.
    pub follow_redirects: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            ca_cert_file: None,
            follow_redirects: true,
        }
    }
}

impl TransportSettings {
    /// Derives settings from client args, using `ssl_cert_file` when no
    /// bundle is given explicitly.
    pub fn from_client_args(args: Option<&ClientArgs>, ssl_cert_file: Option<PathBuf>) -> Self {
        let args = args.cloned().unwrap_or_default();
        Self {
            connect_timeout: args.connect_timeout(),
            ca_cert_file: args.ca_cert_file.or(ssl_cert_file),
            follow_redirects: args.follow_redirects.unwrap_or(true),
        }
    }
}

/// Picks the async backend.
pub fn select_async_transport(settings: &TransportSettings) -> Result<Arc<dyn HttpTransport>, TransportError> {
    #[cfg(feature = "hyper-transport")]
    {
        match HyperTransport::new(settings) {
            Ok(transport) => {
                tracing::debug!("Using hyper transport for async requests");
                return Ok(Arc::new(transport));
            }
            Err(e) => {
                tracing::debug!(error = %e, "hyper transport unavailable, falling back to reqwest");
            }
        }
    }
    Ok(Arc::new(ReqwestTransport::new(settings)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_prefer_explicit_ca_bundle() {
        let args = ClientArgs {
            ca_cert_file: Some("/explicit.pem".into()),
            ..Default::default()
        };
        let settings = TransportSettings::from_client_args(Some(&args), Some("/env.pem".into()));
        assert_eq!(settings.ca_cert_file, Some(PathBuf::from("/explicit.pem")));
        assert!(settings.follow_redirects);

        let settings = TransportSettings::from_client_args(None, Some("/env.pem".into()));
        assert_eq!(settings.ca_cert_file, Some(PathBuf::from("/env.pem")));
    }

    #[tokio::test]
    async fn test_select_async_transport_defaults() {
        assert!(select_async_transport(&TransportSettings::default()).is_ok());
    }
}
