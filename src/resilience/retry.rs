//! Retry orchestration with exponential backoff and jitter.
//!
//! Retries are driven purely by the status code of an outcome, whether that
//! outcome is a response or an error. The last outcome is returned as-is
//! once attempts run out, so callers always see the real status.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryOptions;
use crate::error::{GenAiError, GenAiResult};

/// Default total attempts when retry options are given.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default initial delay in seconds.
pub const DEFAULT_INITIAL_DELAY: f64 = 1.0;
/// Default maximum delay in seconds.
pub const DEFAULT_MAX_DELAY: f64 = 120.0;
/// Default exponential base.
pub const DEFAULT_EXP_BASE: f64 = 2.0;
/// Default jitter fraction.
pub const DEFAULT_JITTER: f64 = 1.0;
/// Status codes retried by default.
pub const DEFAULT_RETRY_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Anything that may carry an HTTP status code.
pub trait StatusCarrier {
    /// Status code, if any.
    fn status_code(&self) -> Option<u16>;
}

impl<T: StatusCarrier> StatusCarrier for GenAiResult<T> {
    fn status_code(&self) -> Option<u16> {
        match self {
            Ok(value) => value.status_code(),
            Err(e) => GenAiError::status_code(e),
        }
    }
}

impl<L> StatusCarrier for crate::transport::HttpResponse<L> {
    fn status_code(&self) -> Option<u16> {
        Some(self.status)
    }
}

/// Resolved retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Status codes that trigger a retry.
    pub retriable_status_codes: Vec<u16>,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the un-jittered delay.
    pub max_delay: Duration,
    /// Exponential base.
    pub exponential_base: f64,
    /// Jitter fraction; each delay is scaled by a factor in `1 ± jitter`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            retriable_status_codes: DEFAULT_RETRY_STATUS_CODES.to_vec(),
            initial_delay: Duration::from_secs_f64(DEFAULT_INITIAL_DELAY),
            max_delay: Duration::from_secs_f64(DEFAULT_MAX_DELAY),
            exponential_base: DEFAULT_EXP_BASE,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// A policy that executes exactly once.
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Resolves caller options. Absent options mean never retry; absent
    /// fields take the defaults.
    pub fn from_options(options: Option<&RetryOptions>) -> Self {
        let Some(options) = options else {
            return Self::never();
        };
        let defaults = Self::default();
        let seconds = |value: Option<f64>, default: Duration| {
            value
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map_or(default, Duration::from_secs_f64)
        };
        Self {
            max_attempts: options.attempts.filter(|a| *a > 0).unwrap_or(defaults.max_attempts),
            retriable_status_codes: options
                .http_status_codes
                .clone()
                .filter(|codes| !codes.is_empty())
                .unwrap_or(defaults.retriable_status_codes),
            initial_delay: seconds(options.initial_delay, defaults.initial_delay),
            max_delay: seconds(options.max_delay, defaults.max_delay),
            exponential_base: options.exp_base.filter(|b| *b > 0.0).unwrap_or(defaults.exponential_base),
            jitter: options.jitter.filter(|j| *j >= 0.0).unwrap_or(defaults.jitter),
        }
    }

    /// Whether an outcome with `status` is retriable under this policy.
    pub fn is_retriable(&self, status: Option<u16>) -> bool {
        status.is_some_and(|s| self.retriable_status_codes.contains(&s))
    }

    /// Un-jittered delay after the zero-based `attempt`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Jittered delay after the zero-based `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter).max(0.0)..=1.0 + self.jitter);
        base.mul_f64(factor)
    }
}

/// Runs an operation under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryOrchestrator {
    policy: RetryPolicy,
}

impl RetryOrchestrator {
    /// Creates an orchestrator.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn next_delay(&self, attempt: u32, status: Option<u16>) -> Option<Duration> {
        if attempt + 1 >= self.policy.max_attempts || !self.policy.is_retriable(status) {
            return None;
        }
        let delay = self.policy.delay(attempt);
        tracing::warn!(
            status = status.unwrap_or_default(),
            attempt = attempt + 1,
            max_attempts = self.policy.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Retriable status received, retrying"
        );
        Some(delay)
    }

    /// Executes `operation`, sleeping on the runtime between attempts.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> GenAiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GenAiResult<T>>,
        T: StatusCarrier,
    {
        let mut attempt = 0;
        loop {
            let outcome = operation().await;
            match self.next_delay(attempt, outcome.status_code()) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return outcome,
            }
            attempt += 1;
        }
    }

    /// Executes `operation`, blocking the thread between attempts.
    pub fn execute_blocking<F, T>(&self, mut operation: F) -> GenAiResult<T>
    where
        F: FnMut() -> GenAiResult<T>,
        T: StatusCarrier,
    {
        let mut attempt = 0;
        loop {
            let outcome = operation();
            match self.next_delay(attempt, outcome.status_code()) {
                Some(delay) => std::thread::sleep(delay),
                None => return outcome,
            }
            attempt += 1;
        }
    }
}
