//! Capability discovery, caching and gating

mod support;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use devops_router::capability::{Capability, ReasonCategory};
use devops_router::transport::HttpResponse;
use devops_router::{CallContext, Credentials, Error};

use support::{MockTransport, params, router_with, test_config};

fn ctx() -> CallContext {
    CallContext::new().with_credentials(Credentials::token("secret-token"))
}

fn gated_config() -> devops_router::Config {
    let mut config = test_config();
    config.capabilities.enabled = true;
    config
}

#[tokio::test]
async fn test_report_is_cached_within_ttl() {
    let (router, mock) = router_with(gated_config(), MockTransport::new());

    let first = router.capability_report(&ctx()).await.unwrap();
    let probes = mock.count();
    assert!(probes > 0);
    assert!(!first.cache_valid);

    let second = router.capability_report(&ctx()).await.unwrap();
    assert!(second.cache_valid);
    assert_eq!(mock.count(), probes);
    assert_eq!(second.operations, first.operations);
    assert_eq!(second.features, first.features);
    assert_eq!(second.timestamp, first.timestamp);
}

#[tokio::test]
async fn test_invalidation_and_expiry_trigger_new_probes() {
    let (router, mock) = router_with(gated_config(), MockTransport::new());
    router.capability_report(&ctx()).await.unwrap();
    let probes = mock.count();

    router.invalidate_capability_cache();
    let report = router.capability_report(&ctx()).await.unwrap();
    assert!(!report.cache_valid);
    assert_eq!(mock.count(), probes * 2);

    let mut config = gated_config();
    config.capabilities.cache_ttl = Duration::ZERO;
    let (router, mock) = router_with(config, MockTransport::new());
    router.capability_report(&ctx()).await.unwrap();
    router.capability_report(&ctx()).await.unwrap();
    assert_eq!(mock.count(), probes * 2);
}

#[tokio::test]
async fn test_expired_caller_does_not_poison_the_cache() {
    let mock = MockTransport::with_default(HttpResponse::new(200, "{}"));
    let (router, mock) = router_with(gated_config(), mock);

    let expired = ctx().with_timeout(Duration::ZERO);
    let err = router.capability_report(&expired).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{err}");
    assert_eq!(mock.count(), 0);

    let report = router.capability_report(&ctx()).await.unwrap();
    assert!(!report.cache_valid);
    assert!(report.features["xray"].available);
    assert!(report.operations["system/configuration"].available);

    let version = router
        .execute_operation(&ctx(), "xray/version", params(json!({})))
        .await
        .unwrap();
    assert_ne!(version["error"], "operation_unavailable");
}

#[tokio::test]
async fn test_cancelled_caller_aborts_discovery() {
    let (router, mock) = router_with(gated_config(), MockTransport::new());

    let cancelled = ctx();
    cancelled.cancel();
    let err = router.capability_report(&cancelled).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(mock.count(), 0);

    router.capability_report(&ctx()).await.unwrap();
    assert!(mock.count() > 0);
}

#[tokio::test]
async fn test_feature_classification() {
    let mock = MockTransport::new();
    mock.on_get("/api/system/ping", 200, "OK")
        .on_get("/xray/api/v1/system/version", 403, "")
        .on_get("/pipelines/api/v1/system/info", 502, "")
        .on_get("/api/federation/status", 401, "");
    let (router, _) = router_with(gated_config(), mock);

    let report = router.capability_report(&ctx()).await.unwrap();
    let feature = |name: &str| report.features[name].clone();

    assert!(feature("artifactory_core").available);
    assert_eq!(
        feature("xray").reason.as_deref(),
        Some("no permission to access this feature")
    );
    assert_eq!(feature("pipelines").reason.as_deref(), Some("unexpected status 502"));
    assert_eq!(
        feature("distribution").reason.as_deref(),
        Some("feature not installed or not available")
    );
    assert_eq!(
        feature("projects").reason.as_deref(),
        Some("Projects feature requires Platform Pro or Enterprise license")
    );
    assert_eq!(
        feature("projects").required,
        vec!["Projects feature", "Platform Pro or Enterprise"]
    );

    // Namespaced operations inherit their feature's verdict
    let op = |name: &str| report.operations[name].clone();
    assert_eq!(op("xray/scan/build").reason, feature("xray").reason);
    assert_eq!(
        ReasonCategory::of(op("projects/list").reason.as_deref().unwrap()),
        ReasonCategory::License
    );
    assert_eq!(
        ReasonCategory::of(op("federation/sync").reason.as_deref().unwrap()),
        ReasonCategory::Permission
    );
    assert!(op("internal/current-user").available);
    assert!(op("repos/list").available);
}

#[tokio::test]
async fn test_admin_and_write_probes_gate_operations() {
    let mock = MockTransport::new();
    mock.on_get("/api/system/configuration", 403, "")
        .on_get("/api/v2/security/permissions", 403, "");
    let (router, mock) = router_with(gated_config(), mock);

    let report = router.capability_report(&ctx()).await.unwrap();
    assert_eq!(
        report.operations["system/configuration"],
        Capability::unavailable("admin permissions required").with_required(&["Admin permission"])
    );
    assert_eq!(
        report.operations["repos/delete"].reason.as_deref(),
        Some("write permission may be required")
    );
    assert!(report.operations["repos/get"].available);

    // Each probe ran once for the whole pass
    assert_eq!(mock.count_for("/api/system/configuration"), 1);
    assert_eq!(mock.count_for("/api/v2/security/permissions"), 1);

    let denial = router
        .execute_operation(&ctx(), "repos/delete", params(json!({"repoKey": "old"})))
        .await
        .unwrap();
    assert_eq!(denial["error"], "operation_unavailable");
    assert_eq!(denial["required"], json!(["Write permission for target resource"]));
    assert_eq!(mock.count_for("/api/repositories/old"), 0);
}

#[tokio::test]
async fn test_missing_credentials_are_optimistic() {
    let (router, mock) = router_with(gated_config(), MockTransport::new());

    let report = router.capability_report(&CallContext::new()).await.unwrap();
    assert_eq!(mock.count(), 0);
    let xray = &report.features["xray"];
    assert!(xray.available);
    assert!(xray.reason.is_none());
    assert!(xray.required.contains(&"Authentication".to_string()));
    assert!(report.operations.values().all(|c| c.available));
}

#[tokio::test]
async fn test_package_features_follow_repository_listing() {
    let mock = MockTransport::new();
    mock.on_get(
        "/api/repositories",
        200,
        r#"[{"key":"libs-release","packageType":"Maven"},{"key":"npm-remote","packageType":"npm"}]"#,
    );
    let (router, _) = router_with(gated_config(), mock);

    let report = router.capability_report(&ctx()).await.unwrap();
    assert_eq!(report.features["package_maven"], Capability::available());
    assert_eq!(report.features["package_npm"], Capability::available());
    let docker = &report.features["package_docker"];
    assert!(docker.available);
    assert!(docker.note.as_deref().unwrap().contains("not currently in use"));
}

#[tokio::test]
async fn test_concurrent_readers_share_one_report() {
    let (router, mock) = router_with(gated_config(), MockTransport::new());
    let router = Arc::new(router);
    router.capability_report(&ctx()).await.unwrap();
    let probes = mock.count();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let router = router.clone();
            tokio::spawn(async move { router.capability_report(&ctx()).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().unwrap().cache_valid);
    }
    assert_eq!(mock.count(), probes);
}

#[tokio::test]
async fn test_health_report() {
    let mock = MockTransport::new();
    mock.on_get("/api/system/ping", 200, "OK");
    let (router, _) = router_with(gated_config(), mock);

    let report = router.health_report(&ctx()).await;
    assert!(report.healthy);
    assert!(report.error.is_none());

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["provider"], "artifactory");
    assert_eq!(value["base_url"], "http://artifactory.test/artifactory");
    let summary = &value["capabilities"]["operations_summary"];
    assert_eq!(
        summary["total"].as_u64().unwrap(),
        summary["available"].as_u64().unwrap() + summary["unavailable"].as_u64().unwrap()
    );
    assert!(summary["unavailable_by_reason"]["not_installed"].as_u64().unwrap() > 0);
    assert_eq!(value["capabilities"]["features"]["artifactory_core"]["available"], true);
}

#[tokio::test]
async fn test_unhealthy_report_carries_error() {
    let mock = MockTransport::new();
    mock.on_get("/api/system/ping", 403, "");
    let (router, _) = router_with(test_config(), mock);

    let report = router.health_report(&ctx()).await;
    assert!(!report.healthy);
    assert!(report.error.unwrap().contains("403"));
    assert!(report.capabilities.is_none());
}

#[tokio::test]
async fn test_available_features_operation() {
    let mock = MockTransport::new();
    mock.on_get("/api/system/ping", 200, "OK");
    let (router, _) = router_with(gated_config(), mock);

    let result = router
        .execute_operation(&ctx(), "internal/available-features", params(json!({})))
        .await
        .unwrap();
    assert_eq!(result["features"]["artifactory_core"]["available"], true);
    assert_eq!(result["features"]["xray"]["available"], false);
    assert!(result["package_types"].as_array().unwrap().contains(&json!("maven")));
    assert_eq!(
        result["operations_count"].as_u64().unwrap() as usize,
        router.operation_mappings().len()
    );
}
