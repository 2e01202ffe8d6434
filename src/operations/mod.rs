//! Operation registry
//!
//! Operations are plain data: an HTTP method, a path template with `{name}`
//! placeholders and the parameter names the template needs. Operations that
//! never touch the network carry a [`Handler`] instead of a path.

pub mod catalog;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::context::CallContext;
use crate::{Error, Result};

/// Call parameters
pub type Params = serde_json::Map<String, Value>;

/// Callback for an in-process operation
pub type HandlerFn =
    Arc<dyn Fn(CallContext, Params) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Prefix reserved for operations served in-process
pub const INTERNAL_PREFIX: &str = "internal/";

/// Maximum number of names listed in an unknown-operation hint
const HINT_LIMIT: usize = 10;

/// How an operation is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// PATCH
    Patch,
    /// HEAD
    Head,
    /// Served by an attached handler, no network I/O
    Internal,
}

impl HttpMethod {
    /// Wire method, `None` for internal operations
    #[must_use]
    pub fn to_reqwest(self) -> Option<Method> {
        match self {
            Self::Get => Some(Method::GET),
            Self::Post => Some(Method::POST),
            Self::Put => Some(Method::PUT),
            Self::Delete => Some(Method::DELETE),
            Self::Patch => Some(Method::PATCH),
            Self::Head => Some(Method::HEAD),
            Self::Internal => None,
        }
    }

    /// Whether leftover parameters travel in the query string rather than a body
    #[must_use]
    pub fn uses_query_string(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Delete)
    }

    /// Method name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-process implementation of an operation
#[derive(Clone)]
pub enum Handler {
    /// Identity of the caller, resolved by the router
    CurrentUser,
    /// Feature availability summary, resolved by the router
    AvailableFeatures,
    /// Arbitrary callback
    Custom(HandlerFn),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentUser => f.write_str("CurrentUser"),
            Self::AvailableFeatures => f.write_str("AvailableFeatures"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One registered operation
#[derive(Debug, Clone, Serialize)]
pub struct OperationMapping {
    /// Upstream operation identifier
    pub operation_id: String,
    /// Method, or `INTERNAL`
    pub method: HttpMethod,
    /// Path with `{name}` placeholders; empty for internal operations
    pub path_template: String,
    /// Parameters that must be present
    pub required_params: Vec<String>,
    /// Parameters that may be present
    pub optional_params: Vec<String>,
    /// The `query` parameter is query-language text sent as `text/plain`
    pub query_language: bool,
    /// In-process implementation
    #[serde(skip)]
    pub handler: Option<Handler>,
}

impl OperationMapping {
    /// HTTP-backed operation
    pub fn new(operation_id: &str, method: HttpMethod, path_template: &str) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            method,
            path_template: path_template.to_string(),
            required_params: Vec::new(),
            optional_params: Vec::new(),
            query_language: false,
            handler: None,
        }
    }

    /// In-process operation
    pub fn internal(operation_id: &str, handler: Handler) -> Self {
        Self {
            handler: Some(handler),
            ..Self::new(operation_id, HttpMethod::Internal, "")
        }
    }

    /// Set required parameters
    #[must_use]
    pub fn required(mut self, params: &[&str]) -> Self {
        self.required_params = params.iter().map(ToString::to_string).collect();
        self
    }

    /// Set optional parameters
    #[must_use]
    pub fn optional(mut self, params: &[&str]) -> Self {
        self.optional_params = params.iter().map(ToString::to_string).collect();
        self
    }

    /// Mark as a query-language operation
    #[must_use]
    pub fn query_language(mut self) -> Self {
        self.query_language = true;
        self
    }

    /// Whether this operation is served in-process
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.method == HttpMethod::Internal
    }

    /// First required parameter absent from `params`
    #[must_use]
    pub fn missing_param(&self, params: &Params) -> Option<&str> {
        self.required_params
            .iter()
            .find(|p| params.get(p.as_str()).is_none_or(Value::is_null))
            .map(String::as_str)
    }

    /// Placeholder names in the path template, in order
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.path_template.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start + 1..].find('}') else {
                break;
            };
            names.push(&rest[start + 1..start + 1 + len]);
            rest = &rest[start + 1 + len + 1..];
        }
        names
    }
}

/// Name-keyed table of operations
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    operations: BTreeMap<String, OperationMapping>,
}

impl OperationRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation under its canonical name
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the name is already taken.
    pub fn register(&mut self, name: &str, mapping: OperationMapping) -> Result<()> {
        let name = normalize_operation_name(name);
        if self.operations.contains_key(&name) {
            return Err(Error::Config(format!("operation '{name}' registered twice")));
        }
        self.operations.insert(name, mapping);
        Ok(())
    }

    /// Look up by canonical name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OperationMapping> {
        self.operations.get(name)
    }

    /// Whether the canonical name is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Number of operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operation names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Name/mapping pairs, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OperationMapping)> {
        self.operations.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// New registry holding the operations `keep` accepts
    #[must_use]
    pub fn filter(&self, mut keep: impl FnMut(&str, &OperationMapping) -> bool) -> Self {
        Self {
            operations: self
                .operations
                .iter()
                .filter(|(name, mapping)| keep(name, mapping))
                .map(|(name, mapping)| (name.clone(), mapping.clone()))
                .collect(),
        }
    }

    /// Up to ten names, followed by `...` when there are more
    #[must_use]
    pub fn hint(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names().take(HINT_LIMIT).map(str::to_string).collect();
        if self.len() > HINT_LIMIT {
            names.push("...".to_string());
        }
        names
    }

    /// Owned copy of the table
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, OperationMapping> {
        self.operations.clone()
    }
}

/// Canonical operation name
///
/// Internal names pass through untouched. Otherwise `-` and `_` become `/`,
/// and a bare verb maps to its default resource.
#[must_use]
pub fn normalize_operation_name(name: &str) -> String {
    if name.starts_with(INTERNAL_PREFIX) {
        return name.to_string();
    }
    let normalized = name.replace(['-', '_'], "/");
    if normalized.contains('/') {
        return normalized;
    }
    match normalized.as_str() {
        "list" => "repos/list",
        "get" => "repos/get",
        "create" => "repos/create",
        "update" => "repos/update",
        "delete" => "repos/delete",
        "upload" => "artifacts/upload",
        "download" => "artifacts/download",
        "search" => "search/artifacts",
        _ => return normalized,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_separator_variants_normalize_identically() {
        for name in ["repos-list", "repos_list", "repos/list"] {
            assert_eq!(normalize_operation_name(name), "repos/list");
        }
        assert_eq!(
            normalize_operation_name("artifacts-properties_set"),
            "artifacts/properties/set"
        );
    }

    #[test]
    fn test_bare_verbs() {
        assert_eq!(normalize_operation_name("list"), "repos/list");
        assert_eq!(normalize_operation_name("download"), "artifacts/download");
        assert_eq!(normalize_operation_name("search"), "search/artifacts");
        assert_eq!(normalize_operation_name("frobnicate"), "frobnicate");
    }

    #[test]
    fn test_internal_names_untouched() {
        assert_eq!(
            normalize_operation_name("internal/current-user"),
            "internal/current-user"
        );
    }

    #[test]
    fn test_missing_param_and_placeholders() {
        let mapping = OperationMapping::new("copy", HttpMethod::Post, "/api/copy/{src}?to={dst}")
            .required(&["src", "dst"]);
        assert_eq!(mapping.placeholders(), vec!["src", "dst"]);

        let mut params = Params::new();
        params.insert("src".into(), json!("a/b"));
        assert_eq!(mapping.missing_param(&params), Some("dst"));
        params.insert("dst".into(), Value::Null);
        assert_eq!(mapping.missing_param(&params), Some("dst"));
        params.insert("dst".into(), json!("c"));
        assert_eq!(mapping.missing_param(&params), None);
    }

    #[test]
    fn test_registry_rejects_duplicates_and_hints() {
        let mut registry = OperationRegistry::new();
        for i in 0..12 {
            registry
                .register(
                    &format!("ops/op{i:02}"),
                    OperationMapping::new("x", HttpMethod::Get, "/x"),
                )
                .unwrap();
        }
        assert!(
            registry
                .register("ops-op00", OperationMapping::new("x", HttpMethod::Get, "/x"))
                .is_err()
        );

        let hint = registry.hint();
        assert_eq!(hint.len(), 11);
        assert_eq!(hint.last().map(String::as_str), Some("..."));
    }

    #[test]
    fn test_filter_leaves_original_untouched() {
        let mut registry = OperationRegistry::new();
        registry
            .register("repos/list", OperationMapping::new("l", HttpMethod::Get, "/r"))
            .unwrap();
        registry
            .register("repos/delete", OperationMapping::new("d", HttpMethod::Delete, "/r"))
            .unwrap();

        let filtered = registry.filter(|name, _| name.ends_with("list"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(registry.len(), 2);
    }
}
