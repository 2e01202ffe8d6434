//! Scripted in-memory transport shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Method;

use devops_router::context::CallContext;
use devops_router::transport::{HttpRequest, HttpResponse, Transport};
use devops_router::{Config, OperationRouter, Result};

/// Answers requests from a script keyed by method and path, recording every call
///
/// A scripted sequence is consumed front to back; its last response repeats.
/// Paths are matched exactly first, then without their query string.
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<HttpResponse>>>,
    default: HttpResponse,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Unscripted paths answer 404 with an empty body
    pub fn new() -> Self {
        Self::with_default(HttpResponse::new(404, ""))
    }

    pub fn with_default(default: HttpResponse) -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            default,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script one response
    pub fn on(&self, method: Method, path: &str, status: u16, body: &str) -> &Self {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(HttpResponse::new(status, body.to_string()));
        self
    }

    pub fn on_get(&self, path: &str, status: u16, body: &str) -> &Self {
        self.on(Method::GET, path, status, body)
    }

    /// Every request seen so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests whose path (query included) equals `path`
    pub fn count_for(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.path == path).count()
    }

    pub fn last(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }

    fn answer(&self, request: &HttpRequest) -> HttpResponse {
        let mut routes = self.routes.lock();
        let bare = request.path.split('?').next().unwrap_or_default().to_string();
        let key = [request.path.clone(), bare]
            .into_iter()
            .map(|path| (request.method.clone(), path))
            .find(|key| routes.contains_key(key));
        let Some(queue) = key.and_then(|key| routes.get_mut(&key)) else {
            return self.default.clone();
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_else(|| self.default.clone())
        } else {
            queue.front().cloned().unwrap_or_else(|| self.default.clone())
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, ctx: &CallContext, request: HttpRequest) -> Result<HttpResponse> {
        ctx.guard(async {
            self.requests.lock().push(request.clone());
            Ok(self.answer(&request))
        })
        .await
    }
}

/// Configuration with fast retries, no rate limiting and capability gating off
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.target.base_url = "http://artifactory.test/artifactory".to_string();
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config.rate_limit.enabled = false;
    config.capabilities.enabled = false;
    config
}

pub fn router(config: Config) -> (OperationRouter, Arc<MockTransport>) {
    router_with(config, MockTransport::new())
}

pub fn router_with(config: Config, mock: MockTransport) -> (OperationRouter, Arc<MockTransport>) {
    let mock = Arc::new(mock);
    let router = OperationRouter::new(config, mock.clone()).expect("router");
    (router, mock)
}

pub fn params(value: serde_json::Value) -> devops_router::Params {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("params must be an object, got {other}"),
    }
}
