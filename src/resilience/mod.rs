//! Resilience layer: bounded, status-driven retries.

mod retry;

pub use retry::{
    RetryOrchestrator, RetryPolicy, StatusCarrier, DEFAULT_EXP_BASE, DEFAULT_INITIAL_DELAY,
    DEFAULT_JITTER, DEFAULT_MAX_DELAY, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_STATUS_CODES,
};
