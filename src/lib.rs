//! DevOps Router Library
//!
//! Capability-aware operation router for DevOps tool APIs.
//!
//! # Features
//!
//! - **Operation Registry**: abstract operation names mapped to HTTP call templates
//! - **Capability Discovery**: probes licensed and optional features, gates unavailable operations
//! - **Permission Discovery**: narrows the operation set to what the caller may invoke
//! - **AQL**: fluent query builder and pre-flight validator
//! - **Failsafes**: retries with exponential backoff, per-minute rate limiting, deadlines
//!
//! # Example
//!
//! ```no_run
//! use devops_router::{CallContext, Config, Credentials, OperationRouter};
//! use serde_json::json;
//!
//! # async fn run() -> devops_router::Result<()> {
//! let router = OperationRouter::from_config(Config::load(None)?)?;
//! let ctx = CallContext::new().with_credentials(Credentials::token("secret"));
//! let params = json!({"repoKey": "libs-release"});
//! let repo = router
//!     .execute_operation(&ctx, "repos-get", params.as_object().cloned().unwrap_or_default())
//!     .await?;
//! println!("{repo}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod capability;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod failsafe;
pub mod integrity;
pub mod operations;
pub mod permissions;
pub mod query;
pub mod router;
pub mod transport;

pub use config::{AuthType, Config};
pub use context::{CallContext, Credentials};
pub use error::{Error, Result};
pub use operations::{OperationMapping, OperationRegistry, Params};
pub use router::{HealthReport, OperationRouter};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))?;
        }
        _ => {
            subscriber
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))?;
        }
    }

    Ok(())
}
