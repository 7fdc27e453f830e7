//! Request pacing for external APIs.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as DirectLimiter,
};
use nonzero_ext::nonzero;
use std::sync::Arc;
use std::time::Duration;

/// Paces requests to at most `per_second` per second, shared across clones
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<DirectLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    per_second: f64,
}

impl RateLimiter {
    /// Returns `None` when `per_second` is not a positive finite number
    pub fn per_second(per_second: f64) -> Option<Self> {
        if !per_second.is_finite() || per_second <= 0.0 {
            return None;
        }
        let quota = Quota::with_period(Duration::from_secs_f64(1.0 / per_second))?
            .allow_burst(nonzero!(1u32));
        Some(Self {
            inner: Arc::new(DirectLimiter::direct(quota)),
            per_second,
        })
    }

    /// Wait until the next request may be sent
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }

    pub fn rate(&self) -> f64 {
        self.per_second
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("per_second", &self.per_second)
            .finish()
    }
}
