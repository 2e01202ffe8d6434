//! Capability-aware operation router
//!
//! [`OperationRouter::execute_operation`] is the single entry point. A call
//! flows through name normalization, registry lookup, parameter validation,
//! the capability gate and finally one of three dispatch paths: an
//! in-process handler, a query-language POST, or a templated HTTP request.

mod search;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::capability::{
    Capability, CapabilityDiscoverer, CapabilityReport, OperationsSummary, PACKAGE_TYPES,
    format_capability_error,
};
use crate::config::Config;
use crate::context::{CallContext, Credentials};
use crate::failsafe::Dispatcher;
use crate::integrity::verify_sha256;
use crate::operations::{
    Handler, OperationMapping, OperationRegistry, Params, catalog, normalize_operation_name,
};
use crate::permissions::{PermissionDiscoverer, Permissions, filter_operations_by_permissions};
use crate::query::{to_aql_json, validate_aql_query};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, RequestBody, Transport};
use crate::{Error, Result};

use self::search::{numeric, validate_search_params};

/// Routes abstract operations to one target deployment
pub struct OperationRouter {
    config: Config,
    dispatcher: Dispatcher,
    /// Every registered operation
    registry: Arc<OperationRegistry>,
    /// Operations the current identity may invoke
    effective: RwLock<Arc<OperationRegistry>>,
    capabilities: CapabilityDiscoverer,
    permissions: PermissionDiscoverer,
}

impl OperationRouter {
    /// Router over HTTP with the default Artifactory catalog
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.target.base_url, config.target.timeout)?;
        Self::new(config, Arc::new(transport))
    }

    /// Router over `transport` with the default Artifactory catalog
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid configuration.
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_registry(config, transport, catalog::artifactory()?)
    }

    /// Router over `transport` serving `registry`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid configuration.
    pub fn with_registry(
        config: Config,
        transport: Arc<dyn Transport>,
        registry: OperationRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(transport, &config)?;
        let registry = Arc::new(registry);
        info!(
            provider = %config.target.provider,
            base_url = %config.target.base_url,
            operations = registry.len(),
            "Operation router initialized"
        );
        Ok(Self {
            capabilities: CapabilityDiscoverer::new(config.capabilities.cache_ttl),
            permissions: PermissionDiscoverer::new(config.permissions.cache_ttl),
            effective: RwLock::new(registry.clone()),
            registry,
            dispatcher,
            config,
        })
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Currently effective, possibly permission-filtered, operations
    #[must_use]
    pub fn operation_mappings(&self) -> BTreeMap<String, OperationMapping> {
        self.effective.read().to_map()
    }

    /// Execute an operation
    ///
    /// Returns the decoded upstream response, the handler's value, or a
    /// structured denial object when the capability report marks the
    /// operation unavailable.
    ///
    /// # Errors
    ///
    /// Validation errors (unknown operation, missing or invalid parameter,
    /// malformed query) before any network I/O; transport and upstream
    /// errors after it.
    #[tracing::instrument(skip(self, ctx, params), fields(provider = %self.config.target.provider))]
    pub async fn execute_operation(
        &self,
        ctx: &CallContext,
        operation: &str,
        params: Params,
    ) -> Result<Value> {
        let name = normalize_operation_name(operation);
        let mapping = {
            let effective = self.effective.read();
            effective
                .get(&name)
                .cloned()
                .ok_or_else(|| Error::UnknownOperation {
                    operation: name.clone(),
                    available: effective.hint(),
                })?
        };

        if let Some(parameter) = mapping.missing_param(&params) {
            return Err(Error::MissingParameter {
                operation: name,
                parameter: parameter.to_string(),
            });
        }
        if name.starts_with("search/") {
            validate_search_params(&name, &params).map_err(|message| {
                Error::InvalidParameter {
                    operation: name.clone(),
                    message,
                }
            })?;
        }

        if let Some(denied) = self.capability_gate(ctx, &name).await {
            info!(operation = %name, reason = ?denied.reason, "Operation unavailable");
            return Ok(format_capability_error(&name, &denied));
        }

        debug!(operation = %name, method = %mapping.method, "Dispatching operation");
        if let Some(handler) = &mapping.handler {
            return self.run_handler(ctx, handler, params).await;
        }
        if mapping.query_language {
            return self.execute_query(ctx, &name, &mapping, &params).await;
        }
        let request = build_request(&name, &mapping, &params)?;
        let response = self.dispatcher.execute(ctx, request).await?;
        decode_response(&response)
    }

    /// Denial for `name`, if gating is on and the report marks it unavailable
    ///
    /// Discovery failures are logged and let the call through.
    async fn capability_gate(&self, ctx: &CallContext, name: &str) -> Option<Capability> {
        if !self.config.capabilities.enabled {
            return None;
        }
        let report = match self.capability_report(ctx).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Capability discovery failed, not gating");
                return None;
            }
        };
        report.denies(name).cloned()
    }

    async fn run_handler(&self, ctx: &CallContext, handler: &Handler, params: Params) -> Result<Value> {
        match handler {
            Handler::CurrentUser => {
                let perms = self.permissions.discover(ctx, &self.dispatcher).await?;
                Ok(current_user(&perms))
            }
            Handler::AvailableFeatures => {
                let report = self.capability_report(ctx).await?;
                Ok(json!({
                    "features": report.features,
                    "package_types": PACKAGE_TYPES,
                    "operations_count": self.effective.read().len(),
                    "timestamp": report.timestamp,
                }))
            }
            Handler::Custom(callback) => ctx.guard(callback(ctx.clone(), params)).await,
        }
    }

    /// POST query-language text and post-process the result set
    async fn execute_query(
        &self,
        ctx: &CallContext,
        name: &str,
        mapping: &OperationMapping,
        params: &Params,
    ) -> Result<Value> {
        let text = match params.get("query") {
            Some(Value::String(text)) => text.clone(),
            Some(criteria @ Value::Object(_)) => format!("items.find({})", to_aql_json(criteria)?),
            other => {
                return Err(Error::InvalidParameter {
                    operation: name.to_string(),
                    message: format!(
                        "query must be a string or an object, got {}",
                        other.map_or("nothing".to_string(), json_kind)
                    ),
                });
            }
        };
        validate_aql_query(&text)?;

        let method = mapping
            .method
            .to_reqwest()
            .ok_or_else(|| Error::Config(format!("operation '{name}' has no HTTP method")))?;
        let request = HttpRequest::new(method, mapping.path_template.as_str())
            .with_body(RequestBody::Text(text))
            .with_header("Content-Type", "text/plain")
            .with_header("Accept", "application/json");
        let response = self.dispatcher.execute(ctx, request).await?;
        if !response.is_success() {
            return Err(Error::upstream(response.status, &response.text()));
        }

        let mut result = response.json()?;
        let limit = numeric(params, "limit").map_err(|message| Error::InvalidParameter {
            operation: name.to_string(),
            message,
        })?;
        if let Some(results) = result.get_mut("results").and_then(Value::as_array_mut) {
            let mut has_more = false;
            if let Some(limit) = limit.and_then(|l| usize::try_from(l).ok()) {
                if limit < results.len() {
                    results.truncate(limit);
                    has_more = true;
                }
            }
            let total = results.len();
            if let Some(object) = result.as_object_mut() {
                if has_more {
                    object.insert("has_more".to_string(), Value::Bool(true));
                }
                object.insert("total_count".to_string(), json!(total));
            }
        }
        Ok(result)
    }

    /// Probe the health endpoint
    ///
    /// # Errors
    ///
    /// Returns the transport error, or `Error::Upstream` naming the base URL
    /// when the probe does not answer 200.
    pub async fn health_check(&self, ctx: &CallContext) -> Result<()> {
        let target = &self.config.target;
        let response = self
            .dispatcher
            .execute(ctx, HttpRequest::get(target.health_endpoint.as_str()))
            .await?;
        if response.status != 200 {
            return Err(Error::upstream(
                response.status,
                &format!(
                    "{} health check for {} returned unexpected status {} (expected 200 OK)",
                    target.provider, target.base_url, response.status
                ),
            ));
        }
        Ok(())
    }

    /// Check that `creds` can reach the deployment
    ///
    /// The auth mode matching the credential form is used for this probe
    /// only; the configured mode is never changed.
    ///
    /// # Errors
    ///
    /// `Error::Authentication` when no complete credential form is present,
    /// otherwise whatever the health probe returns.
    pub async fn validate_credentials(
        &self,
        ctx: &CallContext,
        creds: &HashMap<String, String>,
    ) -> Result<()> {
        let credentials = Credentials::from_map(creds);
        let Some(auth) = credentials.preferred_auth() else {
            return Err(Error::Authentication(
                "provide a token, an api_key, or a username and password".to_string(),
            ));
        };
        let probe_ctx = ctx
            .clone()
            .with_credentials(credentials)
            .with_auth_override(auth);
        self.health_check(&probe_ctx).await
    }

    /// Cached capability report, or a fresh discovery pass
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` or `Error::Timeout` if the context is
    /// cancelled or expires mid-pass; no report is cached then.
    pub async fn capability_report(&self, ctx: &CallContext) -> Result<CapabilityReport> {
        self.capabilities
            .discover(ctx, &self.dispatcher, &self.registry)
            .await
    }

    /// Force the next capability lookup to probe again
    pub fn invalidate_capability_cache(&self) {
        self.capabilities.invalidate();
    }

    /// Discover the caller's permissions and narrow the effective operations
    ///
    /// # Errors
    ///
    /// Returns `Error::Discovery` if the identity cannot be resolved; the
    /// effective operations are left unchanged in that case.
    pub async fn discover_permissions(&self, ctx: &CallContext) -> Result<Permissions> {
        let perms = self.permissions.discover(ctx, &self.dispatcher).await?;
        let filtered = filter_operations_by_permissions(&self.registry, &perms);
        *self.effective.write() = Arc::new(filtered);
        Ok(perms)
    }

    /// Drop cached permissions and restore the full operation set
    pub fn invalidate_permissions(&self) {
        self.permissions.invalidate();
        *self.effective.write() = self.registry.clone();
    }

    /// Health plus a capability summary
    pub async fn health_report(&self, ctx: &CallContext) -> HealthReport {
        let health = self.health_check(ctx).await;
        let mut report = HealthReport {
            provider: self.config.target.provider.clone(),
            healthy: health.is_ok(),
            base_url: self.config.target.base_url.clone(),
            error: health.err().map(|e| e.to_string()),
            capabilities: None,
            capability_error: None,
        };
        if self.config.capabilities.enabled {
            match self.capability_report(ctx).await {
                Ok(caps) => {
                    report.capabilities = Some(CapabilitySummary {
                        operations_summary: caps.operations_summary(),
                        features: caps.features,
                        cache_valid: caps.cache_valid,
                        timestamp: caps.timestamp,
                    });
                }
                Err(e) => report.capability_error = Some(format!("failed to discover capabilities: {e}")),
            }
        }
        report
    }

    /// Download `repo/path` and verify it against `expected_sha256`
    ///
    /// # Errors
    ///
    /// `Error::Upstream` on a non-2xx answer, `Error::ChecksumMismatch` when
    /// the content does not match.
    pub async fn fetch_artifact(
        &self,
        ctx: &CallContext,
        repo: &str,
        path: &str,
        expected_sha256: &str,
    ) -> Result<Bytes> {
        let request = HttpRequest::get(format!("/{repo}/{}", path.trim_start_matches('/')))
            .with_header("Accept", "*/*");
        let response = self.dispatcher.execute(ctx, request).await?;
        if !response.is_success() {
            return Err(Error::upstream(response.status, &response.text()));
        }
        verify_sha256(&response.body, expected_sha256)?;
        debug!(repo, path, bytes = response.body.len(), "Artifact verified");
        Ok(response.body)
    }
}

/// Result of [`OperationRouter::health_report`]
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Provider name
    pub provider: String,
    /// Health probe answered 200
    pub healthy: bool,
    /// Target base URL
    pub base_url: String,
    /// Health probe failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Capability summary, when gating is enabled and discovery succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<CapabilitySummary>,
    /// Capability discovery failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_error: Option<String>,
}

/// Capability section of a [`HealthReport`]
#[derive(Debug, Clone, Serialize)]
pub struct CapabilitySummary {
    /// Verdict per feature
    pub features: BTreeMap<String, Capability>,
    /// Operation counts
    pub operations_summary: OperationsSummary,
    /// Report came from the cache
    pub cache_valid: bool,
    /// When the report was produced
    pub timestamp: DateTime<Utc>,
}

fn current_user(perms: &Permissions) -> Value {
    json!({
        "username": perms.username(),
        "is_admin": perms.is_admin,
        "groups": perms.groups,
        "identity": perms.identity,
        "repositories": perms.repository_access.keys().collect::<Vec<_>>(),
    })
}

/// Substitute placeholders; leftovers go to the query string or JSON body
fn build_request(name: &str, mapping: &OperationMapping, params: &Params) -> Result<HttpRequest> {
    let method = mapping
        .method
        .to_reqwest()
        .ok_or_else(|| Error::Config(format!("operation '{name}' has no HTTP method")))?;

    let placeholders = mapping.placeholders();
    let mut path = mapping.path_template.clone();
    for placeholder in &placeholders {
        let value = params
            .get(*placeholder)
            .filter(|v| !v.is_null())
            .ok_or_else(|| Error::MissingParameter {
                operation: name.to_string(),
                parameter: (*placeholder).to_string(),
            })?;
        path = path.replace(&format!("{{{placeholder}}}"), &param_text(value));
    }

    let rest: Map<String, Value> = params
        .iter()
        .filter(|(key, value)| !placeholders.contains(&key.as_str()) && !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let mut request = HttpRequest::new(method, String::new());
    if mapping.method.uses_query_string() {
        if !rest.is_empty() {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in &rest {
                query.append_pair(key, &param_text(value));
            }
            let separator = if path.contains('?') { '&' } else { '?' };
            path = format!("{path}{separator}{}", query.finish());
        }
    } else if !rest.is_empty() {
        request = request.with_body(RequestBody::Json(Value::Object(rest)));
    }
    request.path = path;
    Ok(request)
}

/// Text form of a parameter; arrays become comma-separated lists
fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(param_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
    .to_string()
}

/// Decode a 2xx body: empty as null, JSON as parsed, anything else as text
fn decode_response(response: &HttpResponse) -> Result<Value> {
    if !response.is_success() {
        return Err(Error::upstream(response.status, &response.text()));
    }
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    if let Ok(value) = serde_json::from_slice(&response.body) {
        return Ok(value);
    }
    let text = response.text();
    let head = text.trim_start().get(..64).unwrap_or(text.trim_start()).to_lowercase();
    if head.starts_with("<!doctype") || head.starts_with("<html") {
        return Err(Error::upstream(
            response.status,
            "received HTML response instead of JSON",
        ));
    }
    Ok(Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::HttpMethod;
    use reqwest::Method;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_get_leftovers_become_query_string() {
        let mapping = OperationMapping::new("x", HttpMethod::Get, "/api/repositories/{repoKey}");
        let request = build_request(
            "repos/get",
            &mapping,
            &params(json!({"repoKey": "libs", "type": "local", "repos": ["a", "b"]})),
        )
        .unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/api/repositories/libs?repos=a%2Cb&type=local");
        assert_eq!(request.body, RequestBody::Empty);
    }

    #[test]
    fn test_existing_query_is_extended() {
        let mapping = OperationMapping::new(
            "x",
            HttpMethod::Delete,
            "/api/storage/{repoKey}/{itemPath}?properties={properties}",
        );
        let request = build_request(
            "artifacts/properties/delete",
            &mapping,
            &params(json!({"repoKey": "r", "itemPath": "a/b.jar", "properties": "k", "recursive": 1})),
        )
        .unwrap();
        assert_eq!(request.path, "/api/storage/r/a/b.jar?properties=k&recursive=1");
    }

    #[test]
    fn test_post_leftovers_become_json_body() {
        let mapping = OperationMapping::new("x", HttpMethod::Post, "/api/repositories/{repoKey}");
        let request = build_request(
            "repos/update",
            &mapping,
            &params(json!({"repoKey": "libs", "description": "d", "notes": null})),
        )
        .unwrap();
        assert_eq!(request.path, "/api/repositories/libs");
        assert_eq!(request.body, RequestBody::Json(json!({"description": "d"})));
    }

    #[test]
    fn test_unfilled_placeholder_is_missing_parameter() {
        let mapping = OperationMapping::new("x", HttpMethod::Get, "/{repoKey}/{itemPath}");
        let err = build_request("artifacts/download", &mapping, &params(json!({"repoKey": "r"})))
            .unwrap_err();
        assert!(matches!(err, Error::MissingParameter { parameter, .. } if parameter == "itemPath"));
    }

    #[test]
    fn test_decode_response_forms() {
        assert_eq!(decode_response(&HttpResponse::new(204, "")).unwrap(), Value::Null);
        assert_eq!(
            decode_response(&HttpResponse::new(200, r#"{"a":1}"#)).unwrap(),
            json!({"a": 1})
        );
        assert_eq!(
            decode_response(&HttpResponse::new(200, "OK")).unwrap(),
            json!("OK")
        );
        assert!(decode_response(&HttpResponse::new(200, "<!DOCTYPE html><html></html>")).is_err());

        let err = decode_response(&HttpResponse::new(404, "not here")).unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
