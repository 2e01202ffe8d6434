//! Probing a deployment for features and deriving operation availability

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Capability, CapabilityReport};
use crate::cache::TtlCache;
use crate::context::CallContext;
use crate::failsafe::Dispatcher;
use crate::operations::{INTERNAL_PREFIX, OperationRegistry};
use crate::transport::{HttpRequest, HttpResponse};
use crate::{Error, Result};

/// One feature and how to detect it
#[derive(Debug, Clone, Copy)]
pub struct FeatureProbe {
    /// Feature name in the report
    pub name: &'static str,
    /// Endpoint probed with GET
    pub endpoint: &'static str,
    /// Prerequisites shown to the caller
    pub required: &'static [&'static str],
    /// Operation-name prefix governed by this feature
    pub namespace: Option<&'static str>,
}

/// Features probed on every discovery pass
pub const FEATURES: &[FeatureProbe] = &[
    FeatureProbe {
        name: "artifactory_core",
        endpoint: "/api/system/ping",
        required: &["Artifactory license"],
        namespace: None,
    },
    FeatureProbe {
        name: "xray",
        endpoint: "/xray/api/v1/system/version",
        required: &["Xray license", "Xray installation"],
        namespace: Some("xray/"),
    },
    FeatureProbe {
        name: "pipelines",
        endpoint: "/pipelines/api/v1/system/info",
        required: &["Pipelines license", "Cloud or self-hosted Pipelines"],
        namespace: Some("pipelines/"),
    },
    FeatureProbe {
        name: "mission_control",
        endpoint: "/mc/api/v1/system/info",
        required: &["Mission Control license", "Enterprise license"],
        namespace: Some("mc/"),
    },
    FeatureProbe {
        name: "distribution",
        endpoint: "/distribution/api/v1/system/info",
        required: &["Distribution license", "Edge nodes"],
        namespace: Some("distribution/"),
    },
    FeatureProbe {
        name: "access_service",
        endpoint: "/access/api/v1/system/ping",
        required: &["Access service", "Platform installation"],
        namespace: None,
    },
    FeatureProbe {
        name: "projects",
        endpoint: "/access/api/v1/projects",
        required: &["Projects feature", "Platform Pro or Enterprise"],
        namespace: Some("projects/"),
    },
    FeatureProbe {
        name: "federation",
        endpoint: "/api/federation/status",
        required: &["Federation license", "Enterprise Plus"],
        namespace: Some("federation/"),
    },
];

/// Package types reported as `package_<type>` features
pub const PACKAGE_TYPES: &[&str] = &[
    "maven", "gradle", "ivy", "sbt", "npm", "bower", "yarn", "nuget", "gems", "pypi", "conda",
    "docker", "helm", "go", "cargo", "conan", "debian", "rpm", "vagrant", "gitlfs", "generic",
];

const ADMIN_PROBE: &str = "/api/system/configuration";
const PERMISSION_PROBE: &str = "/api/v2/security/permissions";
const REPOSITORIES: &str = "/api/repositories";

const NOT_IN_USE: &str = "package type not currently in use but may be available";
const AUTH_NOTE: &str = "availability requires authentication";

/// Discovers and caches capability reports
pub struct CapabilityDiscoverer {
    cache: TtlCache<CapabilityReport>,
}

impl CapabilityDiscoverer {
    /// Discoverer whose reports stay fresh for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
        }
    }

    /// Fresh cached report, marked `cache_valid`, without network access
    pub fn cached_report(&self) -> Option<CapabilityReport> {
        self.cache.get().map(|mut report| {
            report.cache_valid = true;
            report
        })
    }

    /// Forget the cached report
    pub fn invalidate(&self) {
        self.cache.invalidate();
        debug!("Capability cache invalidated");
    }

    /// Cached report if fresh, otherwise a new discovery pass
    ///
    /// Individual probe failures only affect their own feature or operation.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` or `Error::Timeout` if the caller's context
    /// is cancelled or runs out of time mid-pass. Nothing is cached then.
    pub async fn discover(
        &self,
        ctx: &CallContext,
        dispatcher: &Dispatcher,
        registry: &OperationRegistry,
    ) -> Result<CapabilityReport> {
        if let Some(report) = self.cached_report() {
            debug!(
                age_secs = self.cache.age().unwrap_or_default().as_secs(),
                "Returning cached capability report"
            );
            return Ok(report);
        }
        ctx.check()?;

        let pass = Pass { ctx, dispatcher };
        let mut features = pass.probe_features().await?;
        features.extend(pass.package_features().await?);
        let operations = pass.classify_operations(registry, &features).await?;

        let report = CapabilityReport {
            operations,
            features,
            timestamp: Utc::now(),
            cache_valid: false,
        };
        self.cache.store(report.clone());

        info!(
            operations = report.operations.len(),
            features = report.features.len(),
            available_operations = count_available(&report.operations),
            available_features = count_available(&report.features),
            "Capability discovery completed"
        );
        Ok(report)
    }
}

fn count_available(caps: &BTreeMap<String, Capability>) -> usize {
    caps.values().filter(|c| c.available).count()
}

/// One discovery pass. Admin and permission probes run at most once.
struct Pass<'a> {
    ctx: &'a CallContext,
    dispatcher: &'a Dispatcher,
}

impl Pass<'_> {
    /// GET through the dispatcher
    ///
    /// The outer error aborts the pass when a failure coincides with the
    /// caller's context being cancelled or past its deadline. Other failures,
    /// including per-request timeouts, are returned for local classification.
    async fn get(&self, endpoint: &str) -> Result<Result<HttpResponse>> {
        let outcome = self
            .dispatcher
            .execute(self.ctx, HttpRequest::get(endpoint))
            .await;
        if outcome.is_err() {
            self.ctx.check()?;
        }
        Ok(outcome)
    }

    async fn probe_features(&self) -> Result<BTreeMap<String, Capability>> {
        let probes = FEATURES.iter().map(|feature| async move {
            let capability = self.probe(feature.endpoint).await?;
            Ok::<_, Error>((feature.name.to_string(), annotate(feature, capability)))
        });
        join_all(probes).await.into_iter().collect()
    }

    /// GET an endpoint and classify the outcome
    async fn probe(&self, endpoint: &str) -> Result<Capability> {
        match self.get(endpoint).await? {
            Ok(response) => Ok(match response.status {
                200 => Capability::available(),
                401 | 403 => Capability::unavailable("no permission to access this feature"),
                404 => Capability::unavailable("feature not installed or not available"),
                status => Capability::unavailable(format!("unexpected status {status}")),
            }),
            Err(Error::Authentication(_)) => Ok(Capability::available()
                .with_required(&["Authentication"])
                .with_note(AUTH_NOTE)),
            Err(e) => {
                warn!(endpoint, error = %e, "Capability probe failed");
                Ok(Capability::unavailable(format!("failed to probe endpoint: {e}")))
            }
        }
    }

    async fn package_features(&self) -> Result<BTreeMap<String, Capability>> {
        let seen = match self.get(REPOSITORIES).await? {
            Ok(response) if response.is_success() => {
                Some(package_types_in_use(&response.json().unwrap_or(Value::Null)))
            }
            Ok(response) => {
                warn!(status = response.status, "Repository listing failed during discovery");
                None
            }
            Err(e) => {
                warn!(error = %e, "Repository listing failed during discovery");
                None
            }
        };

        Ok(PACKAGE_TYPES
            .iter()
            .map(|pt| {
                let capability = match &seen {
                    Some(seen) if seen.contains(*pt) => Capability::available(),
                    Some(_) => Capability::available().with_note(NOT_IN_USE),
                    None => Capability::available()
                        .with_note("package type availability could not be verified"),
                };
                (format!("package_{pt}"), capability)
            })
            .collect())
    }

    async fn classify_operations(
        &self,
        registry: &OperationRegistry,
        features: &BTreeMap<String, Capability>,
    ) -> Result<BTreeMap<String, Capability>> {
        let mut admin: Option<Capability> = None;
        let mut write: Option<Capability> = None;
        let mut operations = BTreeMap::new();

        for (name, mapping) in registry.iter() {
            let capability = if name.starts_with(INTERNAL_PREFIX) || mapping.is_internal() {
                Capability::available()
            } else if let Some(denied) = gated_by_feature(name, features) {
                denied
            } else if is_admin_operation(name) {
                if admin.is_none() {
                    admin = Some(self.admin_check().await?);
                }
                admin.clone().unwrap_or_else(Capability::available)
            } else if is_mutating(name) {
                if write.is_none() {
                    write = Some(self.write_check().await?);
                }
                write.clone().unwrap_or_else(Capability::available)
            } else {
                Capability::available()
            };
            operations.insert(name.to_string(), capability);
        }
        Ok(operations)
    }

    async fn admin_check(&self) -> Result<Capability> {
        let required = ["Admin permission"];
        match self.get(ADMIN_PROBE).await? {
            Ok(response) => Ok(match response.status {
                200 => Capability::available(),
                403 => Capability::unavailable("admin permissions required").with_required(&required),
                _ => Capability::unavailable("unable to verify admin permissions")
                    .with_required(&required),
            }),
            Err(Error::Authentication(_)) => Ok(Capability::available()
                .with_required(&["Admin permission", "Authentication"])
                .with_note(AUTH_NOTE)),
            Err(e) => {
                warn!(error = %e, "Admin capability probe failed");
                Ok(Capability::unavailable("failed to verify admin permissions")
                    .with_required(&required))
            }
        }
    }

    /// Best-effort; anything short of an explicit 403 is optimistic
    async fn write_check(&self) -> Result<Capability> {
        match self.get(PERMISSION_PROBE).await? {
            Ok(response) if response.status == 403 => {
                Ok(Capability::unavailable("write permission may be required")
                    .with_required(&["Write permission for target resource"]))
            }
            Ok(_) => Ok(Capability::available()),
            Err(e) => {
                debug!(error = %e, "Permission probe unavailable, assuming write access");
                Ok(Capability::available().with_note(
                    "permission check unavailable, operation may fail if permissions are insufficient",
                ))
            }
        }
    }
}

/// Feature-specific wording for unavailable features
fn annotate(feature: &FeatureProbe, mut capability: Capability) -> Capability {
    let extra = std::mem::take(&mut capability.required);
    capability.required = feature.required.iter().map(ToString::to_string).collect();
    capability.required.extend(extra);
    if !capability.available && feature.name == "projects" {
        capability.reason =
            Some("Projects feature requires Platform Pro or Enterprise license".to_string());
    }
    capability
}

/// Denial inherited from an unavailable feature owning the operation's namespace
fn gated_by_feature(name: &str, features: &BTreeMap<String, Capability>) -> Option<Capability> {
    FEATURES
        .iter()
        .filter(|f| f.namespace.is_some_and(|ns| name.starts_with(ns)))
        .find_map(|f| features.get(f.name).filter(|c| !c.available).cloned())
}

fn is_admin_operation(name: &str) -> bool {
    name.contains("admin") || name == "system/configuration"
}

fn is_mutating(name: &str) -> bool {
    ["create", "update", "delete"]
        .iter()
        .any(|verb| name.contains(verb))
}

fn package_types_in_use(repos: &Value) -> HashSet<String> {
    repos
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|repo| repo.get("packageType").and_then(Value::as_str))
        .map(str::to_lowercase)
        .collect()
}
