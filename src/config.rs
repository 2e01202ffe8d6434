//! Configuration management

use std::{collections::HashMap, env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Target tool deployment
    pub target: TargetConfig,
    /// Retry policy for outbound calls
    pub retry: RetryConfig,
    /// Outbound rate limiting
    pub rate_limit: RateLimitConfig,
    /// Capability discovery and gating
    pub capabilities: CapabilityConfig,
    /// Permission discovery
    pub permissions: PermissionConfig,
}

/// How outbound requests authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// `Authorization: Bearer <token or api key>`
    #[default]
    Bearer,
    /// `X-JFrog-Art-Api: <api key>`
    ApiKey,
    /// HTTP basic auth
    Basic,
    /// No authentication header
    None,
}

impl AuthType {
    /// Stable lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bearer => "bearer",
            Self::ApiKey => "api_key",
            Self::Basic => "basic",
            Self::None => "none",
        }
    }
}

/// Target deployment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Human-readable provider name used in reports
    pub provider: String,
    /// Base address of the deployment
    pub base_url: String,
    /// Authentication mode
    pub auth_type: AuthType,
    /// Headers sent on every request (supports `${VAR}` expansion)
    pub default_headers: HashMap<String, String>,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Path probed by health checks
    pub health_endpoint: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        let default_headers = HashMap::from([
            ("Accept".to_string(), "application/json".to_string()),
            ("X-JFrog-Art-Api-Version".to_string(), "2".to_string()),
        ]);
        Self {
            provider: "artifactory".to_string(),
            base_url: "https://mycompany.jfrog.io/artifactory".to_string(),
            auth_type: AuthType::Bearer,
            default_headers,
            timeout: Duration::from_secs(60),
            health_endpoint: "/api/system/ping".to_string(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Treat HTTP 429 as transient
    pub retry_on_rate_limit: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            retry_on_rate_limit: true,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Requests allowed per minute
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 600,
        }
    }
}

/// Capability discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// Consult the capability report before dispatching
    pub enabled: bool,
    /// How long a discovered report stays fresh
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl: Duration::from_secs(15 * 60),
        }
    }
}

/// Permission discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// How long discovered permissions stay fresh
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // DEVOPS_ROUTER_TARGET__BASE_URL -> target.base_url
        figment = figment.merge(Env::prefixed("DEVOPS_ROUTER_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Reject values the router cannot work with
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.target.base_url).map_err(|e| {
            Error::Config(format!("invalid base_url '{}': {e}", self.target.base_url))
        })?;
        if self.rate_limit.enabled && self.rate_limit.requests_per_minute == 0 {
            return Err(Error::Config(
                "rate_limit.requests_per_minute must be positive when enabled".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(Error::Config(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        Ok(())
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                match env::var("HOME") {
                    Ok(home) => path_str.replacen('~', &home, 1),
                    Err(_) => path_str.clone(),
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in header values
    fn expand_env_vars(&mut self) {
        let Ok(re) = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") else {
            return;
        };

        for value in self.target.default_headers.values_mut() {
            *value = Self::expand_string(&re, value);
        }
        self.target.base_url = Self::expand_string(&re, &self.target.base_url);
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}
