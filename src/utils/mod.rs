//! Utility modules supporting the acquisition pipeline.
//!
//! - [`HttpClient`]: shared reqwest client with timeouts
//! - [`RateLimiter`]: request pacing for citation APIs
//! - [`RetryPolicy`] and [`retry_decision`]: exponential backoff as a pure decision
//! - [`with_retry`]: execute a source call with automatic retry on transient errors
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use citation_harvest::sources::SourceError;
//! use citation_harvest::utils::{with_retry, RetryPolicy};
//!
//! # async fn fetch_data() -> Result<String, SourceError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! let policy = RetryPolicy::default().max_retries(3);
//! let result = with_retry(policy, fetch_data).await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod rate_limit;
mod retry;

pub use http::{HttpClient, DEFAULT_TIMEOUT};
pub use rate_limit::RateLimiter;
pub use retry::{
    citation_retry_policy, retry_decision, with_retry, RetryDecision, RetryOn, RetryPolicy,
    TransientError,
};
