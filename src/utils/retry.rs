//! Retry utilities with exponential backoff.
//!
//! The decision whether to retry is a pure function of the attempt number and
//! the error kind ([`retry_decision`]), so it can be tested without any I/O.
//! [`with_retry`] wraps it for API calls made by the citation sources.

use std::time::Duration;
use tokio::time::sleep;

use crate::sources::SourceError;

/// Which transient errors a policy retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    /// Every transient error
    AnyTransient,
    /// Only rate-limit responses (429 or an explicit rate-limit signal)
    RateLimitOnly,
}

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Which errors are retried
    pub retry_on: RetryOn,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            retry_on: RetryOn::AnyTransient,
        }
    }
}

impl RetryPolicy {
    /// Set the retry ceiling
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Exponential delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powf(retry.saturating_sub(1) as f64);
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()))
    }
}

/// Transient errors that should trigger a retry
#[derive(Debug, Clone, PartialEq)]
pub enum TransientError {
    /// Connection refused or reset
    Network,
    /// Rate limit exceeded (with optional retry-after seconds)
    RateLimit(Option<u64>),
    /// Server error (5xx)
    ServerError,
    /// Request timeout
    Timeout,
}

impl TransientError {
    /// Check if a reqwest error represents a transient error
    pub fn from_reqwest_error(err: &reqwest::Error) -> Option<Self> {
        if err.is_timeout() {
            return Some(TransientError::Timeout);
        }
        if let Some(status) = err.status() {
            return Self::from_status(status, None);
        }
        if err.is_connect() || err.is_request() || err.is_body() {
            return Some(TransientError::Network);
        }
        None
    }

    /// Classify an HTTP status code
    pub fn from_status(status: reqwest::StatusCode, retry_after: Option<u64>) -> Option<Self> {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Some(TransientError::RateLimit(retry_after))
        } else if status == reqwest::StatusCode::REQUEST_TIMEOUT {
            Some(TransientError::Timeout)
        } else if status.is_server_error() {
            Some(TransientError::ServerError)
        } else {
            None
        }
    }

    /// Check if a SourceError represents a transient error
    pub fn from_source_error(err: &SourceError) -> Option<Self> {
        match err {
            SourceError::RateLimit(retry_after) => Some(TransientError::RateLimit(*retry_after)),
            SourceError::Network(_) => Some(TransientError::Network),
            SourceError::Timeout => Some(TransientError::Timeout),
            SourceError::Api(msg) => {
                let msg_lower = msg.to_lowercase();
                if msg_lower.contains("timeout") {
                    Some(TransientError::Timeout)
                } else if msg_lower.contains("service unavailable")
                    || msg_lower.contains("temporarily unavailable")
                {
                    Some(TransientError::ServerError)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn is_rate_limit(&self) -> bool {
        matches!(self, TransientError::RateLimit(_))
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then try the same operation again
    Retry { delay: Duration },
    /// Stop; the error is permanent or the ceiling is reached
    GiveUp,
}

/// Decide whether to retry after `attempts` failed attempts
///
/// `error` is `None` for permanent errors, which are never retried.
pub fn retry_decision(
    policy: &RetryPolicy,
    attempts: u32,
    error: Option<&TransientError>,
) -> RetryDecision {
    let Some(error) = error else {
        return RetryDecision::GiveUp;
    };
    if policy.retry_on == RetryOn::RateLimitOnly && !error.is_rate_limit() {
        return RetryDecision::GiveUp;
    }
    if attempts == 0 || attempts > policy.max_retries {
        return RetryDecision::GiveUp;
    }

    let mut delay = policy.backoff(attempts);
    if let TransientError::RateLimit(Some(seconds)) = error {
        delay = delay.max(Duration::from_secs(*seconds)).min(policy.max_delay);
    }
    RetryDecision::Retry { delay }
}

/// Execute an async operation with retry logic
///
/// Permanent errors are returned immediately; transient ones are retried as
/// long as [`retry_decision`] allows.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let mut attempts = 0;
    let mut operation = operation;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(
                        "Operation succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                let transient = TransientError::from_source_error(&error);
                match retry_decision(&policy, attempts, transient.as_ref()) {
                    RetryDecision::Retry { delay } => {
                        tracing::debug!(
                            "Transient error on attempt {}: {}, retrying in {:?}",
                            attempts,
                            error,
                            delay
                        );
                        sleep(delay).await;
                    }
                    RetryDecision::GiveUp => {
                        if transient.is_some() {
                            tracing::warn!(
                                "Operation failed after {} attempts: {}",
                                attempts,
                                error
                            );
                        }
                        return Err(error);
                    }
                }
            }
        }
    }
}

/// Retry policy for citation source lookups: one retry, rate limits only
pub fn citation_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(30),
        backoff_multiplier: 2.0,
        retry_on: RetryOn::RateLimitOnly,
    }
}
