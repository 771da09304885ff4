//! Integration tests for credential refresh and discovery.

use integrations_genai::auth::{AdcLoader, CredentialLoader, CredentialManager, Credentials};
use integrations_genai::config::Environment;
use integrations_genai::error::{AuthenticationError, GenAiError};
use integrations_genai::mocks::{MockCredentialLoader, MockCredentials};
use secrecy::ExposeSecret;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manager_with(credentials: Arc<MockCredentials>) -> Arc<CredentialManager> {
    Arc::new(CredentialManager::new(
        Some(credentials),
        Some("project".to_string()),
        Arc::new(MockCredentialLoader::failing()),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_refresh_once() {
    // Arrange
    let credentials = Arc::new(MockCredentials::expired().with_refresh_delay(Duration::from_millis(50)));
    let manager = manager_with(credentials.clone());

    // Act
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.async_access_token().await })
        })
        .collect();
    let mut tokens = Vec::new();
    for handle in handles {
        tokens.push(handle.await.unwrap().unwrap());
    }

    // Assert
    assert_eq!(credentials.refresh_count(), 1);
    assert!(tokens.iter().all(|t| t.expose_secret() == "refreshed-token-1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_caller_keeps_refresh_single_flight() {
    // Arrange
    let credentials = Arc::new(MockCredentials::expired().with_refresh_delay(Duration::from_millis(200)));
    let manager = manager_with(credentials.clone());

    // Act - Abort the first caller while its refresh is still running
    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.async_access_token().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    first.abort();
    let token = manager.async_access_token().await.unwrap();

    // Assert
    assert_eq!(credentials.refresh_count(), 1);
    assert_eq!(token.expose_secret(), "refreshed-token-1");
}

#[test]
fn test_concurrent_threads_refresh_once() {
    // Arrange
    let credentials = Arc::new(MockCredentials::expired().with_refresh_delay(Duration::from_millis(50)));
    let manager = manager_with(credentials.clone());

    // Act
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            std::thread::spawn(move || manager.access_token())
        })
        .collect();
    let tokens: Vec<_> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();

    // Assert
    assert_eq!(credentials.refresh_count(), 1);
    assert!(tokens.iter().all(|t| t.expose_secret() == "refreshed-token-1"));
}

#[test]
fn test_valid_token_is_not_refreshed() {
    let credentials = Arc::new(MockCredentials::valid("still-good"));
    let manager = manager_with(credentials.clone());

    assert_eq!(manager.access_token().unwrap().expose_secret(), "still-good");
    assert_eq!(credentials.refresh_count(), 0);
}

#[test]
fn test_refresh_failure_surfaces_as_authentication_error() {
    let credentials = Arc::new(MockCredentials::expired().failing_refresh());
    let manager = manager_with(credentials);

    let err = manager.access_token().unwrap_err();
    assert!(matches!(
        err,
        GenAiError::Authentication(AuthenticationError::RefreshFailed { .. })
    ));
}

#[tokio::test]
async fn test_lazy_discovery_runs_once() {
    // Arrange
    let loader = Arc::new(MockCredentialLoader::new(
        Arc::new(MockCredentials::valid("discovered")),
        Some("adc-project".to_string()),
    ));
    let manager = CredentialManager::new(None, None, loader.clone());

    // Act
    let first = manager.async_access_token().await.unwrap();
    let second = manager.async_access_token().await.unwrap();

    // Assert
    assert_eq!(first.expose_secret(), "discovered");
    assert_eq!(second.expose_secret(), "discovered");
    assert_eq!(loader.load_count(), 1);
    assert_eq!(manager.project(), Some("adc-project".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_adc_authorized_user_refresh_against_token_endpoint() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.fresh",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("adc.json");
    let mut file = std::fs::File::create(&file_path).unwrap();
    write!(
        file,
        r#"{{"type":"authorized_user","client_id":"id","client_secret":"secret","refresh_token":"refresh"}}"#
    )
    .unwrap();

    let env = Environment {
        application_credentials: Some(file_path),
        ..Default::default()
    };
    let loader = AdcLoader::new(env).with_token_url(format!("{}/token", server.uri()));

    // Act
    let token = tokio::task::spawn_blocking(move || {
        let (credentials, _) = loader.load(Some("explicit"))?;
        credentials.refresh()?;
        Ok::<_, AuthenticationError>(credentials.token())
    })
    .await
    .unwrap()
    .unwrap();

    // Assert
    let token = token.unwrap();
    assert_eq!(token.token.expose_secret(), "ya29.fresh");
    assert!(!token.is_expired());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_adc_refresh_rejected_by_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("adc.json");
    std::fs::write(
        &file_path,
        r#"{"type":"authorized_user","client_id":"id","client_secret":"secret","refresh_token":"bad"}"#,
    )
    .unwrap();
    let env = Environment {
        application_credentials: Some(file_path),
        ..Default::default()
    };
    let loader = AdcLoader::new(env).with_token_url(format!("{}/token", server.uri()));

    let result = tokio::task::spawn_blocking(move || {
        let (credentials, _) = loader.load(None)?;
        credentials.refresh()
    })
    .await
    .unwrap();

    assert!(matches!(result, Err(AuthenticationError::RefreshFailed { .. })));
}

#[test]
fn test_adc_without_any_source_fails() {
    let dir = tempfile::tempdir().unwrap();
    let env = Environment {
        home: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let err = AdcLoader::new(env).load(None).err();
    assert_eq!(err, Some(AuthenticationError::NoCredentials));
}
