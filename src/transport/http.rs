//! reqwest-backed transport
//!
//! Joins request paths onto the configured base URL and performs exactly one
//! HTTP exchange per `send`. Retries, auth and rate limiting live above this
//! layer in the dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use tracing::{debug, trace};

use super::{HttpRequest, HttpResponse, RequestBody, Transport};
use crate::context::CallContext;
use crate::{Error, Result};

/// HTTP transport for one deployment
pub struct HttpTransport {
    /// HTTP client
    client: Client,
    /// Base URL without trailing slash
    base_url: String,
    /// Per-request timeout
    timeout: Duration,
}

impl HttpTransport {
    /// Create a new HTTP transport
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the base URL does not parse or the client
    /// cannot be constructed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid base_url '{base_url}': {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Base URL requests are resolved against
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a request path
    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    fn map_error(&self, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(format!("no response within {:?}", self.timeout))
        } else {
            Error::Transport(err.to_string())
        }
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = self.url_for(&request.path);
        trace!(method = %request.method, url = %url, "Sending request");

        let mut builder = self.client.request(request.method.clone(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(content_type) = request.body.content_type()
            && request.header(header::CONTENT_TYPE.as_str()).is_none()
        {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(serde_json::to_vec(&value)?),
            RequestBody::Text(text) => builder.body(text),
        };

        let response = builder.send().await.map_err(|e| self.map_error(&e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| self.map_error(&e))?;

        debug!(method = %request.method, url = %url, status, bytes = body.len(), "Response received");
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, ctx: &CallContext, request: HttpRequest) -> Result<HttpResponse> {
        ctx.guard(self.exchange(request)).await
    }
}
