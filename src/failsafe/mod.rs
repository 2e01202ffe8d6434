//! Failsafe mechanisms around the transport: auth, rate limiting, retry

mod rate_limiter;
mod retry;

pub use rate_limiter::RateLimiter;
pub use retry::{RetryPolicy, with_retry};

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use crate::config::{AuthType, Config};
use crate::context::CallContext;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use crate::{Error, Result};

/// Header carrying an Artifactory API key
pub const API_KEY_HEADER: &str = "X-JFrog-Art-Api";

/// Transport wrapped with default headers, auth, rate limiting and retry
///
/// Every outbound call made by the router and both discoverers goes through
/// one `Dispatcher`, so they share the rate limit and retry policy.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    default_headers: HashMap<String, String>,
    auth_type: AuthType,
    retry: RetryPolicy,
    rate_limiter: Arc<RateLimiter>,
}

impl Dispatcher {
    /// Create from configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the rate limit configuration is unusable.
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Result<Self> {
        Ok(Self {
            transport,
            default_headers: config.target.default_headers.clone(),
            auth_type: config.target.auth_type,
            retry: RetryPolicy::new(&config.retry),
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)?),
        })
    }

    /// Configured auth mode
    #[must_use]
    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    /// Send a request with retries
    ///
    /// Transient statuses (5xx, and 429 when enabled) are retried for every
    /// method. Connection-level failures are retried only for idempotent
    /// methods, since a POST may have reached the server before the
    /// connection dropped. Once retries are exhausted the last response is
    /// returned as-is, whatever its status; callers decide how to surface it.
    ///
    /// # Errors
    ///
    /// `Error::Authentication` without any I/O when credentials are missing,
    /// `Error::Cancelled` / `Error::Timeout` from the context, or the last
    /// transport error.
    pub async fn execute(&self, ctx: &CallContext, request: HttpRequest) -> Result<HttpResponse> {
        let request = self.prepare(ctx, request)?;
        let name = format!("{} {}", request.method, request.path);
        let idempotent = request.method.is_idempotent();

        with_retry(
            &self.retry,
            ctx,
            &name,
            || self.attempt(ctx, request.clone()),
            |outcome| match outcome {
                Ok(response) => self.retry.is_retryable_status(response.status),
                Err(e) => {
                    idempotent
                        && (matches!(e, Error::Transport(_) | Error::Http(_) | Error::Io(_))
                            || (matches!(e, Error::Timeout(_)) && !ctx.is_expired()))
                }
            },
        )
        .await
    }

    /// One attempt: wait for a rate-limit permit, then send
    async fn attempt(&self, ctx: &CallContext, request: HttpRequest) -> Result<HttpResponse> {
        self.rate_limiter.acquire(ctx).await?;
        self.transport.send(ctx, request).await
    }

    /// Apply default headers and authentication
    fn prepare(&self, ctx: &CallContext, request: HttpRequest) -> Result<HttpRequest> {
        let mut prepared = HttpRequest {
            headers: Vec::with_capacity(self.default_headers.len() + request.headers.len() + 1),
            ..request.clone()
        };
        for (name, value) in &self.default_headers {
            prepared.set_header(name.as_str(), value.as_str());
        }
        for (name, value) in request.headers {
            prepared.set_header(name, value);
        }
        if let Some((name, value)) = self.auth_header(ctx)? {
            prepared.set_header(name, value);
        }
        Ok(prepared)
    }

    /// Authentication header for the effective auth mode
    fn auth_header(&self, ctx: &CallContext) -> Result<Option<(&'static str, String)>> {
        let auth = ctx.auth_type(self.auth_type);
        if auth == AuthType::None {
            return Ok(None);
        }
        let creds = ctx.credentials().ok_or_else(|| {
            Error::Authentication(format!("no credentials in context for {} auth", auth.as_str()))
        })?;

        let header = match auth {
            AuthType::Bearer => creds
                .token
                .as_ref()
                .or(creds.api_key.as_ref())
                .map(|t| ("Authorization", format!("Bearer {t}"))),
            AuthType::ApiKey => creds
                .api_key
                .as_ref()
                .or(creds.token.as_ref())
                .map(|k| (API_KEY_HEADER, k.clone())),
            AuthType::Basic => match (&creds.username, &creds.password) {
                (Some(user), Some(pass)) => Some((
                    "Authorization",
                    format!("Basic {}", BASE64.encode(format!("{user}:{pass}"))),
                )),
                _ => None,
            },
            AuthType::None => None,
        };

        match header {
            Some(h) => {
                debug!(auth = auth.as_str(), "Applied authentication");
                Ok(Some(h))
            }
            None => Err(Error::Authentication(format!(
                "credentials do not support {} auth",
                auth.as_str()
            ))),
        }
    }
}
