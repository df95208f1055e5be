//! Rate limiting for the callback endpoint.
//!
//! The callback handler drives signature checks and database writes from
//! unauthenticated input, so it is the natural brute-force target.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter guarding callback validation.
pub struct CallbackRateLimiter {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl CallbackRateLimiter {
    /// Create a limiter with the given sustained rate and burst size.
    ///
    /// Zero arguments fall back to the defaults (5/s sustained, burst 20).
    pub fn new(per_second: u32, burst_size: u32) -> Self {
        let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::new(5).unwrap());
        let burst_size = NonZeroU32::new(burst_size).unwrap_or(NonZeroU32::new(20).unwrap());

        let quota = Quota::per_second(per_second).allow_burst(burst_size);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Whether a request should be admitted.
    pub fn check(&self) -> bool {
        match self.limiter.check() {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("Rate limit exceeded for callback endpoint");
                false
            }
        }
    }
}

impl Default for CallbackRateLimiter {
    fn default() -> Self {
        Self::new(5, 20)
    }
}

impl Clone for CallbackRateLimiter {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_allows_burst_then_limits() {
        let limiter = CallbackRateLimiter::new(1, 5);

        for i in 0..5 {
            assert!(limiter.check(), "request {} should be within burst", i);
        }

        assert!(!limiter.check(), "request after burst should be limited");
    }

    #[tokio::test]
    async fn test_refills_over_time() {
        let limiter = CallbackRateLimiter::new(10, 1);

        assert!(limiter.check());
        assert!(!limiter.check());

        // 10 per second = one token roughly every 100ms.
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(limiter.check());
    }

    #[test]
    fn test_zero_arguments_fall_back_to_defaults() {
        let limiter = CallbackRateLimiter::new(0, 0);

        // Default burst of 20 admits 20 immediate requests.
        for i in 0..20 {
            assert!(limiter.check(), "default request {} should be admitted", i);
        }
        assert!(!limiter.check());
    }
}
