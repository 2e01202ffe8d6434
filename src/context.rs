//! Per-call context: credentials, cancellation and deadline
//!
//! Credentials are supplied by the caller on every call rather than stored in
//! the router, so one router instance can serve many identities.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::AuthType;
use crate::{Error, Result};

/// Outbound credentials for one caller
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer / access token
    pub token: Option<String>,
    /// API key
    pub api_key: Option<String>,
    /// Basic-auth username
    pub username: Option<String>,
    /// Basic-auth password
    pub password: Option<String>,
}

impl Credentials {
    /// Token credential
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// API key credential
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Username + password credential
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Build from a loose key/value map (`token`, `api_key`, `username`, `password`)
    #[must_use]
    pub fn from_map(creds: &std::collections::HashMap<String, String>) -> Self {
        let pick = |key: &str| creds.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            token: pick("token"),
            api_key: pick("api_key"),
            username: pick("username"),
            password: pick("password"),
        }
    }

    /// Whether any complete credential form is present
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.token.is_some()
            || self.api_key.is_some()
            || (self.username.is_some() && self.password.is_some())
    }

    /// The auth mode best matching the credential form present
    #[must_use]
    pub fn preferred_auth(&self) -> Option<AuthType> {
        if self.token.is_some() || self.api_key.is_some() {
            Some(AuthType::Bearer)
        } else if self.username.is_some() && self.password.is_some() {
            Some(AuthType::Basic)
        } else {
            None
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret material
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Context threaded through every network operation
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    credentials: Option<Credentials>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    auth_override: Option<AuthType>,
}

impl CallContext {
    /// Context without credentials, cancellation or deadline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach credentials
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Share an externally owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Absolute deadline for the whole call, retries included
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Relative deadline for the whole call
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Use this auth mode instead of the configured one, for this call only
    #[must_use]
    pub fn with_auth_override(mut self, auth: AuthType) -> Self {
        self.auth_override = Some(auth);
        self
    }

    /// Credentials, if any
    #[must_use]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Cancellation token
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel every operation using this context
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Deadline, if any
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` means unbounded
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|r| r.is_zero())
    }

    /// `Err` once the context is cancelled or past its deadline
    ///
    /// # Errors
    ///
    /// `Error::Cancelled` or `Error::Timeout`.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else if self.is_expired() {
            Err(Error::Timeout("deadline exceeded".to_string()))
        } else {
            Ok(())
        }
    }

    /// Auth mode for this call
    #[must_use]
    pub fn auth_type(&self, configured: AuthType) -> AuthType {
        self.auth_override.unwrap_or(configured)
    }

    /// Run `fut` until it completes, the context is cancelled, or the deadline passes
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` or `Error::Timeout` when the race is lost,
    /// otherwise whatever `fut` returns.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let bounded = async {
            match self.remaining() {
                Some(left) if left.is_zero() => {
                    Err(Error::Timeout("deadline exceeded".to_string()))
                }
                Some(left) => tokio::time::timeout(left, fut)
                    .await
                    .unwrap_or_else(|_| Err(Error::Timeout("deadline exceeded".to_string()))),
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_map_and_usability() {
        let creds = Credentials::from_map(&HashMap::from([(
            "username".to_string(),
            "alice".to_string(),
        )]));
        assert!(!creds.is_usable());

        let creds = Credentials::from_map(&HashMap::from([
            ("username".to_string(), "alice".to_string()),
            ("password".to_string(), "pw".to_string()),
        ]));
        assert!(creds.is_usable());
        assert_eq!(creds.preferred_auth(), Some(AuthType::Basic));

        let creds = Credentials::from_map(&HashMap::from([("token".to_string(), String::new())]));
        assert!(!creds.is_usable());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = Credentials::token("super-secret-token");
        let text = format!("{creds:?}");
        assert!(!text.contains("super-secret-token"));
        assert!(text.contains("***"));
    }

    #[test]
    fn test_deadline_and_cancellation() {
        let ctx = CallContext::new().with_timeout(Duration::ZERO);
        assert!(ctx.is_expired());
        assert!(matches!(ctx.check(), Err(Error::Timeout(_))));

        let ctx = CallContext::new();
        assert!(ctx.remaining().is_none());
        assert!(ctx.check().is_ok());
        let clone = ctx.clone();
        ctx.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_guard_observes_cancellation() {
        let ctx = CallContext::new();
        ctx.cancel();
        let result: Result<()> = ctx.guard(async { Ok(()) }).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_guard_observes_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(20));
        let result: Result<()> = ctx
            .guard(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));

        let ok = CallContext::new().guard(async { Ok(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }

    #[test]
    fn test_auth_override() {
        let ctx = CallContext::new();
        assert_eq!(ctx.auth_type(AuthType::ApiKey), AuthType::ApiKey);
        let ctx = ctx.with_auth_override(AuthType::Basic);
        assert_eq!(ctx.auth_type(AuthType::ApiKey), AuthType::Basic);
    }
}
