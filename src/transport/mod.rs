//! HTTP execution primitive used by discovery and the router
//!
//! Everything above this layer speaks in `HttpRequest` / `HttpResponse`
//! values, so tests can substitute a scripted transport for the real client.

mod http;

pub use self::http::HttpTransport;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde_json::Value;

use crate::context::CallContext;
use crate::{Error, Result};

/// Request payload
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// JSON document, sent as `application/json`
    Json(Value),
    /// Raw text, sent as `text/plain`
    Text(String),
}

impl RequestBody {
    /// Content type implied by the body
    #[must_use]
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::Json(_) => Some("application/json"),
            Self::Text(_) => Some("text/plain"),
        }
    }
}

/// One outbound call, relative to the target's base URL
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Path (and query) relative to the base URL
    pub path: String,
    /// Payload
    pub body: RequestBody,
    /// Headers, applied in order (later entries win)
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Request without body or headers
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            headers: Vec::new(),
        }
    }

    /// GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Attach a body
    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Add or replace a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Add or replace a header in place (case-insensitive)
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Header value lookup (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response as seen by the router: status plus raw body
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw body
    pub body: Bytes,
}

impl HttpResponse {
    /// Build a response
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx status
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text (lossy)
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the body is not valid JSON.
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.body).map_err(Error::from)
    }
}

/// The `Do(ctx, method, path, body, headers)` primitive
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request. Implementations honor the context's
    /// cancellation token and deadline and never retry on their own.
    async fn send(&self, ctx: &CallContext, request: HttpRequest) -> Result<HttpResponse>;
}
