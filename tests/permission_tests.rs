//! Permission discovery and permission-filtered operation sets

mod support;

use pretty_assertions::assert_eq;
use serde_json::json;

use devops_router::permissions::AccessLevel;
use devops_router::{CallContext, Credentials, Error};

use support::{MockTransport, params, router_with, test_config};

const REPOS: &str = r#"[{"key":"libs-release","type":"LOCAL"},{"key":"jcenter","type":"REMOTE"}]"#;

fn reader_mock() -> MockTransport {
    let mock = MockTransport::new();
    mock.on_get(
        "/api/security/users/alice",
        200,
        r#"{"name":"alice","email":"alice@example.com","admin":false,"groups":["readers"]}"#,
    )
    .on_get("/api/repositories", 200, REPOS)
    .on_get("/api/system/configuration", 403, "");
    mock
}

fn alice() -> CallContext {
    CallContext::new().with_credentials(Credentials::basic("alice", "pw"))
}

#[tokio::test]
async fn test_read_only_identity_narrows_operations() {
    let (router, _) = router_with(test_config(), reader_mock());
    let total = router.operation_mappings().len();

    let perms = router.discover_permissions(&alice()).await.unwrap();
    assert!(!perms.is_admin);
    assert_eq!(perms.username(), Some("alice"));
    assert_eq!(perms.groups, vec!["readers"]);
    assert!(perms.has_access("libs-release", AccessLevel::Read));
    assert!(!perms.has_access("libs-release", AccessLevel::Write));

    let ops = router.operation_mappings();
    assert!(ops.len() < total);
    for kept in ["repos/list", "artifacts/download", "search/aql", "internal/current-user"] {
        assert!(ops.contains_key(kept), "{kept} should be kept");
    }
    for dropped in ["repos/create", "repos/delete", "users/create", "artifacts/upload", "system/configuration"] {
        assert!(!ops.contains_key(dropped), "{dropped} should be dropped");
    }

    // Dropped operations are no longer routable
    let err = router
        .execute_operation(&alice(), "users/create", params(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownOperation { .. }));

    router.invalidate_permissions();
    assert_eq!(router.operation_mappings().len(), total);
}

#[tokio::test]
async fn test_effective_permissions_grant_write_to_non_admin() {
    let mock = reader_mock();
    mock.on_get(
        "/api/storage/libs-release?permissions",
        200,
        r#"{"repo":"libs-release","path":"/","principals":{"users":{"alice":["r","w"]}}}"#,
    )
    .on_get(
        "/api/storage/jcenter?permissions",
        200,
        r#"{"repo":"jcenter","path":"/","principals":{"groups":{"readers":["r","d"]}}}"#,
    );
    let (router, mock) = router_with(test_config(), mock);

    let perms = router.discover_permissions(&alice()).await.unwrap();
    assert!(!perms.is_admin);
    assert!(perms.has_access("libs-release", AccessLevel::Write));
    assert!(!perms.has_access("libs-release", AccessLevel::Delete));
    assert!(perms.has_access("jcenter", AccessLevel::Delete));
    assert!(!perms.has_access("jcenter", AccessLevel::Write));

    let ops = router.operation_mappings();
    for kept in ["artifacts/upload", "artifacts/copy", "artifacts/move", "artifacts/delete"] {
        assert!(ops.contains_key(kept), "{kept} should be kept");
    }
    for dropped in ["repos/create", "repos/delete", "users/create", "system/configuration"] {
        assert!(!ops.contains_key(dropped), "{dropped} should be dropped");
    }

    // Discovery only ever reads
    assert!(mock.requests().iter().all(|r| r.method == reqwest::Method::GET));
}

#[tokio::test]
async fn test_username_is_encoded_in_profile_path() {
    let mock = MockTransport::new();
    mock.on_get("/api/security/users/ci%20bot%2Frelease", 200, r#"{"admin":false}"#)
        .on_get("/api/repositories", 200, "[]");
    let (router, _) = router_with(test_config(), mock);

    let ctx = CallContext::new().with_credentials(Credentials::basic("ci bot/release", "pw"));
    let perms = router.discover_permissions(&ctx).await.unwrap();
    assert_eq!(perms.username(), Some("ci bot/release"));
}

#[tokio::test]
async fn test_expired_caller_is_not_cached_as_reader() {
    let (router, mock) = router_with(test_config(), reader_mock());

    let expired = alice().with_timeout(std::time::Duration::ZERO);
    let err = router.discover_permissions(&expired).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{err}");
    assert_eq!(mock.count(), 0);

    router.discover_permissions(&alice()).await.unwrap();
    assert_eq!(mock.count_for("/api/security/users/alice"), 1);
}

#[tokio::test]
async fn test_admin_keeps_every_operation() {
    let mock = MockTransport::new();
    mock.on_get("/api/security/users/root", 200, r#"{"name":"root","admin":true}"#)
        .on_get("/api/repositories", 200, REPOS)
        .on_get("/api/system/configuration", 200, "<config/>");
    let (router, _) = router_with(test_config(), mock);
    let total = router.operation_mappings().len();

    let ctx = CallContext::new().with_credentials(Credentials::basic("root", "pw"));
    let perms = router.discover_permissions(&ctx).await.unwrap();
    assert!(perms.is_admin);
    assert!(perms.has_access("jcenter", AccessLevel::Delete));
    assert_eq!(router.operation_mappings().len(), total);
}

#[tokio::test]
async fn test_token_identity_is_resolved_remotely() {
    let mock = reader_mock();
    mock.on_get("/api/security/apiKey", 200, r#"{"username":"alice"}"#);
    let (router, mock) = router_with(test_config(), mock);

    let ctx = CallContext::new().with_credentials(Credentials::token("secret-token"));
    let perms = router.discover_permissions(&ctx).await.unwrap();
    assert_eq!(perms.username(), Some("alice"));
    assert_eq!(mock.count_for("/api/security/apiKey"), 1);
}

#[tokio::test]
async fn test_denied_profile_fails_discovery() {
    let mock = MockTransport::new();
    mock.on_get("/api/security/users/alice", 403, r#"{"errors":[{"status":403}]}"#)
        .on_get("/api/repositories", 200, REPOS);
    let (router, mock) = router_with(test_config(), mock);
    let total = router.operation_mappings().len();

    let err = router.discover_permissions(&alice()).await.unwrap_err();
    assert!(matches!(err, Error::Discovery(_)), "{err}");
    assert_eq!(router.operation_mappings().len(), total);
    assert_eq!(mock.count_for("/api/repositories"), 0);
}

#[tokio::test]
async fn test_unresolvable_identity_fails_discovery() {
    let mock = MockTransport::new();
    mock.on_get("/api/security/apiKey", 200, r#"{"apiKey":"***"}"#);
    let (router, _) = router_with(test_config(), mock);

    let ctx = CallContext::new().with_credentials(Credentials::api_key("key"));
    let err = router.discover_permissions(&ctx).await.unwrap_err();
    assert!(matches!(err, Error::Discovery(_)), "{err}");
}

#[tokio::test]
async fn test_permissions_are_cached_per_identity() {
    let mock = reader_mock();
    mock.on_get("/api/security/users/bob", 200, r#"{"name":"bob","admin":false}"#);
    let (router, mock) = router_with(test_config(), mock);

    router.discover_permissions(&alice()).await.unwrap();
    router.discover_permissions(&alice()).await.unwrap();
    assert_eq!(mock.count_for("/api/security/users/alice"), 1);

    let bob = CallContext::new().with_credentials(Credentials::basic("bob", "pw"));
    let perms = router.discover_permissions(&bob).await.unwrap();
    assert_eq!(perms.username(), Some("bob"));
    assert_eq!(mock.count_for("/api/security/users/bob"), 1);

    router.invalidate_permissions();
    router.discover_permissions(&bob).await.unwrap();
    assert_eq!(mock.count_for("/api/security/users/bob"), 2);
}

#[tokio::test]
async fn test_current_user_operation() {
    let (router, _) = router_with(test_config(), reader_mock());

    let user = router
        .execute_operation(&alice(), "internal/current-user", params(json!({})))
        .await
        .unwrap();
    assert_eq!(user["username"], "alice");
    assert_eq!(user["is_admin"], false);
    assert_eq!(user["groups"], json!(["readers"]));
    assert_eq!(user["repositories"], json!(["jcenter", "libs-release"]));
}
