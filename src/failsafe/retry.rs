//! Retry logic with exponential backoff

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tracing::debug;

use crate::config::RetryConfig;
use crate::context::CallContext;
use crate::{Error, Result};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap for any single delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Treat HTTP 429 as transient
    pub retry_on_rate_limit: bool,
}

impl RetryPolicy {
    /// Create from config
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
            retry_on_rate_limit: config.retry_on_rate_limit,
        }
    }

    /// Delays between attempts, at most `max_retries` of them
    #[allow(clippy::cast_possible_truncation)]
    pub fn delays(&self) -> impl Iterator<Item = Duration> + Send + use<> {
        let max_delay = self.max_delay;
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.multiplier as f32)
            .with_max_times(self.max_retries as usize)
            .build()
            .map(move |delay| delay.min(max_delay))
    }

    /// Whether a response status is transient under this policy
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        status >= 500 || (status == 429 && self.retry_on_rate_limit)
    }
}

/// Execute a future with retry logic
///
/// `should_retry` decides per outcome; the last outcome is returned once it
/// declines or the delays run out. Sleeps between attempts end early with
/// `Error::Cancelled` / `Error::Timeout` when the context is cancelled or
/// its deadline passes.
///
/// # Errors
///
/// Returns the last error from `f`, or the context error that interrupted a
/// backoff sleep.
pub async fn with_retry<F, Fut, T, R>(
    policy: &RetryPolicy,
    ctx: &CallContext,
    name: &str,
    mut f: F,
    should_retry: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    R: Fn(&Result<T>) -> bool,
{
    let mut delays = policy.delays();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let outcome = f().await;

        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !should_retry(&outcome) {
            return outcome;
        }

        let Some(delay) = delays.next() else {
            debug!(
                operation = name,
                attempts = attempts,
                "Max retry attempts reached"
            );
            return outcome;
        };

        debug!(
            operation = name,
            attempt = attempts,
            delay_ms = delay.as_millis(),
            "Retrying after backoff"
        );
        ctx.guard(async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
            retry_on_rate_limit: true,
        }
    }

    #[test]
    fn test_delays_grow_and_are_capped() {
        let delays: Vec<_> = policy(5).delays().collect();
        assert_eq!(delays.len(), 5);
        assert_eq!(delays[0], Duration::from_millis(1));
        assert!(delays[1] > delays[0]);
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(4)));
    }

    #[test]
    fn test_retryable_status() {
        let mut p = policy(3);
        assert!(p.is_retryable_status(503));
        assert!(p.is_retryable_status(429));
        assert!(!p.is_retryable_status(404));
        p.retry_on_rate_limit = false;
        assert!(!p.is_retryable_status(429));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(
            &policy(3),
            &CallContext::new(),
            "test",
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Error::Transport("refused".into()))
                } else {
                    Ok(n)
                }
            },
            |r: &Result<u32>| r.is_err(),
        )
        .await
        .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(
            &policy(2),
            &CallContext::new(),
            "test",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Transport("refused".into()))
            },
            |r: &Result<()>| r.is_err(),
        )
        .await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_stops_retrying() {
        let ctx = CallContext::new();
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(
            &policy(10),
            &ctx,
            "test",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                ctx.cancel();
                Err(Error::Transport("refused".into()))
            },
            |r: &Result<()>| r.is_err(),
        )
        .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
