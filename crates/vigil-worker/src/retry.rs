//! Retry utilities with exponential backoff.
//!
//! Backoff sleeps go through `tokio::time::sleep`, so they yield the worker
//! thread and follow a paused test clock.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PollPolicy;

/// Exponential backoff with jitter.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, factor: f64, max: Duration) -> Self {
        Self { base, factor, max }
    }

    /// `min(base * factor^attempt, max)` without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled_ms = self.base.as_millis() as f64 * self.factor.powi(attempt.min(64) as i32);
        if !scaled_ms.is_finite() || scaled_ms >= self.max.as_millis() as f64 {
            return self.max;
        }
        Duration::from_millis(scaled_ms.round() as u64)
    }

    /// Jittered delay, uniformly drawn from `[delay/2, delay]`.
    pub fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        let ms = delay.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(ms / 2..=ms))
    }
}

impl From<&PollPolicy> for Backoff {
    fn from(policy: &PollPolicy) -> Self {
        Self::new(policy.base_delay, policy.backoff_factor, policy.max_delay)
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Operation name for logging.
    pub operation_name: String,
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>, backoff: Backoff) -> Self {
        Self {
            max_retries: 3,
            backoff,
            operation_name: operation_name.into(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded after `retries` failed attempts.
    Success { value: T, retries: u32 },
    /// Operation failed permanently or after all retries were exhausted.
    Failed { error: E, attempts: u32 },
}

/// Execute an async operation, retrying errors that `is_retryable` accepts.
///
/// Permanent errors return immediately without consuming the retry budget.
pub async fn retry_async<F, Fut, T, E, R>(
    config: &RetryConfig,
    is_retryable: R,
    operation: F,
) -> RetryResult<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                return RetryResult::Success {
                    value,
                    retries: attempt,
                }
            }
            Err(e) if attempt < config.max_retries && is_retryable(&e) => {
                let delay = config.backoff.jittered(attempt);
                attempt += 1;
                debug!(
                    operation = %config.operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt + 1,
                }
            }
        }
    }
}

/// Suppresses log spam from a loop that keeps failing.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a successful operation (resets failure count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                failures = self.consecutive_failures,
                "Operation recovered after consecutive failures"
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failed operation. Returns `true` if it should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                failures = self.max_logged_failures,
                "Suppressing further failure logs"
            );
            false
        } else {
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}
