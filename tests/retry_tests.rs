//! Integration tests for the retry orchestrator.

use integrations_genai::config::RetryOptions;
use integrations_genai::error::{ApiError, GenAiError, NetworkError};
use integrations_genai::resilience::{
    RetryOrchestrator, RetryPolicy, StatusCarrier, DEFAULT_RETRY_STATUS_CODES,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, PartialEq)]
struct Reply(u16);

impl StatusCarrier for Reply {
    fn status_code(&self) -> Option<u16> {
        Some(self.0)
    }
}

fn api_error(code: u16) -> GenAiError {
    GenAiError::Api(ApiError {
        code,
        status: String::new(),
        message: "failure".to_string(),
        details: Vec::new(),
    })
}

fn fast_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::from_options(Some(&RetryOptions {
        attempts: Some(attempts),
        initial_delay: Some(0.001),
        max_delay: Some(0.01),
        ..Default::default()
    }))
}

#[tokio::test]
async fn test_retry_success_after_failures() {
    // Arrange
    let orchestrator = RetryOrchestrator::new(fast_policy(5));
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = attempts.clone();

    // Act - Fail twice with 503, then succeed
    let result = orchestrator
        .execute(|| async {
            let count = attempts_clone.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                Err(api_error(503))
            } else {
                Ok(Reply(200))
            }
        })
        .await;

    // Assert
    assert_eq!(result.unwrap(), Reply(200));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_exhausted_returns_last_outcome() {
    let orchestrator = RetryOrchestrator::new(fast_policy(3));
    let attempts = AtomicU32::new(0);

    let result = orchestrator
        .execute(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<Reply, _>(api_error(429))
        })
        .await;

    assert_eq!(result.unwrap_err().status_code(), Some(429));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_network_errors_are_not_retried() {
    let orchestrator = RetryOrchestrator::new(fast_policy(3));
    let attempts = AtomicU32::new(0);

    let result = orchestrator
        .execute(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<Reply, _>(GenAiError::Network(NetworkError::Timeout {
                duration: Duration::from_secs(1),
            }))
        })
        .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_no_options_means_single_attempt() {
    let orchestrator = RetryOrchestrator::new(RetryPolicy::from_options(None));
    let attempts = AtomicU32::new(0);

    let result = orchestrator.execute_blocking(|| {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err::<Reply, _>(api_error(503))
    });

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_custom_status_codes_replace_defaults() {
    let policy = RetryPolicy::from_options(Some(&RetryOptions {
        http_status_codes: Some(vec![418]),
        ..Default::default()
    }));

    assert!(policy.is_retriable(Some(418)));
    assert!(!policy.is_retriable(Some(503)));
    assert!(!policy.is_retriable(None));
}

#[test]
fn test_default_policy_values() {
    let policy = RetryPolicy::from_options(Some(&RetryOptions::default()));

    assert_eq!(policy.max_attempts, 3);
    for code in DEFAULT_RETRY_STATUS_CODES {
        assert!(policy.is_retriable(Some(code)));
    }
    assert_eq!(policy.base_delay(0), Duration::from_secs(1));
    assert_eq!(policy.base_delay(1), Duration::from_secs(2));
    assert_eq!(policy.base_delay(10), Duration::from_secs(120));
}

#[test]
fn test_jittered_delay_stays_in_bounds() {
    let policy = RetryPolicy::from_options(Some(&RetryOptions {
        initial_delay: Some(1.0),
        jitter: Some(0.5),
        ..Default::default()
    }));

    for _ in 0..100 {
        let delay = policy.delay(0);
        assert!(delay >= Duration::from_millis(500), "{delay:?}");
        assert!(delay <= Duration::from_millis(1500), "{delay:?}");
    }
}
