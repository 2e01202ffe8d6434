//! Outbound rate limiting

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorLimiter};

use crate::config::RateLimitConfig;
use crate::context::CallContext;
use crate::{Error, Result};

/// Per-minute request throttle shared by every call through one dispatcher
pub struct RateLimiter {
    /// `None` when rate limiting is disabled
    inner: Option<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when enabled with a zero quota.
    pub fn new(config: &RateLimitConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self { inner: None });
        }
        let per_minute = NonZeroU32::new(config.requests_per_minute).ok_or_else(|| {
            Error::Config("rate_limit.requests_per_minute must be positive".to_string())
        })?;
        Ok(Self {
            inner: Some(GovernorLimiter::direct(Quota::per_minute(per_minute))),
        })
    }

    /// Try to acquire a permit without waiting
    pub fn try_acquire(&self) -> bool {
        self.inner.as_ref().is_none_or(|l| l.check().is_ok())
    }

    /// Wait for a permit, giving up if the context is cancelled or expires
    pub async fn acquire(&self, ctx: &CallContext) -> Result<()> {
        let Some(limiter) = &self.inner else {
            return Ok(());
        };
        if limiter.check().is_ok() {
            return Ok(());
        }
        tracing::debug!("Rate limit reached, waiting for permit");
        ctx.guard(async {
            limiter.until_ready().await;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            Error::Timeout(_) => Error::RateLimited("no permit before deadline".to_string()),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_disabled_never_throttles() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: false,
            requests_per_minute: 0,
        })
        .unwrap();
        for _ in 0..100 {
            assert!(limiter.try_acquire());
        }
    }

    #[test]
    fn test_zero_quota_rejected_when_enabled() {
        let result = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_minute: 0,
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_burst_exhausts() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_minute: 2,
        })
        .unwrap();
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_acquire_respects_deadline() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_minute: 1,
        })
        .unwrap();
        let ctx = CallContext::new().with_timeout(Duration::from_millis(20));
        limiter.acquire(&ctx).await.unwrap();
        let err = limiter.acquire(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
    }
}
