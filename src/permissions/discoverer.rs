//! Discovering what the calling identity may do

use std::collections::BTreeSet;
use std::time::Duration;

use futures::{StreamExt, stream};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{AccessLevel, Permissions};
use crate::cache::TtlCache;
use crate::context::{CallContext, Credentials};
use crate::failsafe::Dispatcher;
use crate::integrity::compute_sha256;
use crate::transport::HttpRequest;
use crate::{Error, Result};

const API_KEY_INFO: &str = "/api/security/apiKey";
const REPOSITORIES: &str = "/api/repositories";
const ADMIN_PROBE: &str = "/api/system/configuration";

/// Effective-permission lookups in flight at once
const CONCURRENT_LOOKUPS: usize = 4;

/// Discovers and caches the caller's permissions
///
/// The cache holds one identity at a time; a call made with different
/// credentials misses and replaces it.
pub struct PermissionDiscoverer {
    cache: TtlCache<(String, Permissions)>,
}

impl PermissionDiscoverer {
    /// Discoverer whose results stay fresh for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
        }
    }

    /// Fresh cached permissions for the context's identity
    pub fn cached(&self, ctx: &CallContext) -> Option<Permissions> {
        let subject = subject_of(ctx.credentials());
        self.cache
            .get()
            .filter(|(cached_subject, _)| *cached_subject == subject)
            .map(|(_, perms)| perms)
    }

    /// Forget cached permissions
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Permissions of the identity carried by `ctx`
    ///
    /// # Errors
    ///
    /// Returns `Error::Discovery` if the identity or its profile cannot be
    /// resolved; no permissions are assumed in that case.
    pub async fn discover(&self, ctx: &CallContext, dispatcher: &Dispatcher) -> Result<Permissions> {
        if let Some(perms) = self.cached(ctx) {
            debug!("Returning cached permissions");
            return Ok(perms);
        }

        let username = resolve_username(ctx, dispatcher).await?;
        let mut perms = fetch_profile(ctx, dispatcher, &username).await?;
        probe_repositories(ctx, dispatcher, &mut perms).await?;
        probe_admin(ctx, dispatcher, &mut perms).await?;
        probe_effective_access(ctx, dispatcher, &mut perms).await?;

        info!(
            username = %username,
            is_admin = perms.is_admin,
            repositories = perms.repository_access.len(),
            "Permission discovery completed"
        );
        self.cache.store((subject_of(ctx.credentials()), perms.clone()));
        Ok(perms)
    }
}

/// Stable, non-reversible key for a credential set
fn subject_of(creds: Option<&Credentials>) -> String {
    let Some(creds) = creds else {
        return String::new();
    };
    let material = [
        creds.token.as_deref(),
        creds.api_key.as_deref(),
        creds.username.as_deref(),
        creds.password.as_deref(),
    ]
    .map(Option::unwrap_or_default)
    .join("\u{0}");
    compute_sha256(material.as_bytes())
}

async fn get_json(ctx: &CallContext, dispatcher: &Dispatcher, path: &str) -> Result<Value> {
    let response = dispatcher.execute(ctx, HttpRequest::get(path)).await?;
    if !response.is_success() {
        return Err(Error::upstream(response.status, &response.text()));
    }
    response.json()
}

/// Passes cancellation through, turns everything else into a discovery error
fn discovery_error(step: &str, err: Error) -> Error {
    match err {
        Error::Cancelled | Error::Timeout(_) => err,
        other => Error::Discovery(format!("{step}: {other}")),
    }
}

async fn resolve_username(ctx: &CallContext, dispatcher: &Dispatcher) -> Result<String> {
    if let Some(username) = ctx.credentials().and_then(|c| c.username.clone()) {
        return Ok(username);
    }

    let info = get_json(ctx, dispatcher, API_KEY_INFO)
        .await
        .map_err(|e| discovery_error("failed to resolve identity", e))?;
    ["username", "user", "principal"]
        .iter()
        .find_map(|key| info.get(*key).and_then(Value::as_str))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Discovery("identity response carried no username".to_string()))
}

async fn fetch_profile(
    ctx: &CallContext,
    dispatcher: &Dispatcher,
    username: &str,
) -> Result<Permissions> {
    let path = format!("/api/security/users/{}", urlencoding::encode(username));
    let profile = get_json(ctx, dispatcher, &path)
        .await
        .map_err(|e| discovery_error(&format!("failed to read profile of '{username}'"), e))?;

    let Value::Object(identity) = profile else {
        return Err(Error::Discovery(format!(
            "profile of '{username}' is not a JSON object"
        )));
    };
    let groups = identity
        .get("groups")
        .and_then(Value::as_array)
        .map(|groups| {
            groups
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut perms = Permissions {
        is_admin: identity.get("admin").and_then(Value::as_bool).unwrap_or(false),
        identity,
        groups,
        ..Permissions::default()
    };
    if perms.username().is_none() {
        perms
            .identity
            .insert("name".to_string(), Value::String(username.to_string()));
    }
    Ok(perms)
}

/// Every listed repository grants at least read
async fn probe_repositories(
    ctx: &CallContext,
    dispatcher: &Dispatcher,
    perms: &mut Permissions,
) -> Result<()> {
    match get_json(ctx, dispatcher, REPOSITORIES).await {
        Ok(repos) => {
            for key in repos
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|repo| repo.get("key").and_then(Value::as_str))
            {
                perms.grant(key, AccessLevel::Read);
            }
            Ok(())
        }
        Err(e) => {
            ctx.check()?;
            warn!(error = %e, "Repository listing failed, assuming no repository access");
            Ok(())
        }
    }
}

/// Reading global configuration succeeds only for administrators
async fn probe_admin(
    ctx: &CallContext,
    dispatcher: &Dispatcher,
    perms: &mut Permissions,
) -> Result<()> {
    match dispatcher.execute(ctx, HttpRequest::get(ADMIN_PROBE)).await {
        Ok(response) if response.status == 200 => {
            perms.is_admin = true;
        }
        Ok(_) => {}
        Err(e) => {
            ctx.check()?;
            warn!(error = %e, "Admin probe failed");
        }
    }
    if perms.is_admin {
        let resources: Vec<String> = perms.repository_access.keys().cloned().collect();
        for resource in resources {
            for level in AccessLevel::ALL {
                perms.grant(&resource, level);
            }
        }
    }
    Ok(())
}

/// Write, delete and manage rights from each repository's effective
/// permissions; read-only lookups, so nothing is deployed to find out
async fn probe_effective_access(
    ctx: &CallContext,
    dispatcher: &Dispatcher,
    perms: &mut Permissions,
) -> Result<()> {
    if perms.is_admin {
        return Ok(());
    }
    let Some(username) = perms.username().map(str::to_string) else {
        return Ok(());
    };

    let repositories: Vec<String> = perms.repository_access.keys().cloned().collect();
    let lookups = stream::iter(repositories)
        .map(|repo| async move {
            let path = format!("/api/storage/{}?permissions", urlencoding::encode(&repo));
            let outcome = get_json(ctx, dispatcher, &path).await;
            (repo, outcome)
        })
        .buffer_unordered(CONCURRENT_LOOKUPS)
        .collect::<Vec<_>>()
        .await;

    for (repo, outcome) in lookups {
        match outcome {
            Ok(doc) => {
                for level in effective_levels(&doc, &username, &perms.groups) {
                    perms.grant(&repo, level);
                }
            }
            Err(e) => {
                ctx.check()?;
                debug!(repository = %repo, error = %e, "Effective permissions unavailable, keeping read");
            }
        }
    }
    Ok(())
}

/// Levels granted to the user directly or through any of its groups
fn effective_levels(doc: &Value, username: &str, groups: &[String]) -> BTreeSet<AccessLevel> {
    let principals = doc.get("principals");
    let direct = principals
        .and_then(|p| p.get("users"))
        .and_then(|users| users.get(username));
    let inherited = groups.iter().filter_map(|group| {
        principals
            .and_then(|p| p.get("groups"))
            .and_then(|g| g.get(group))
    });

    direct
        .into_iter()
        .chain(inherited)
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(access_level_of)
        .collect()
}

fn access_level_of(action: &str) -> Option<AccessLevel> {
    match action {
        "r" | "read" => Some(AccessLevel::Read),
        "w" | "write" | "deploy" => Some(AccessLevel::Write),
        "d" | "delete" => Some(AccessLevel::Delete),
        "m" | "manage" | "admin" => Some(AccessLevel::Admin),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_distinguishes_credentials() {
        let a = Credentials::token("a");
        let b = Credentials::token("b");
        assert_ne!(subject_of(Some(&a)), subject_of(Some(&b)));
        assert_eq!(subject_of(Some(&a)), subject_of(Some(&a.clone())));
        assert_eq!(subject_of(None), "");
        assert_eq!(subject_of(Some(&a)).len(), 64);
    }

    #[test]
    fn test_effective_levels_merge_user_and_groups() {
        let doc = serde_json::json!({
            "repo": "libs-release",
            "principals": {
                "users": {"alice": ["r", "w"], "bob": ["m"]},
                "groups": {"deployers": ["r", "d", "n"], "others": ["m"]}
            }
        });
        let groups = vec!["deployers".to_string(), "missing".to_string()];
        let levels = effective_levels(&doc, "alice", &groups);
        assert_eq!(
            levels.into_iter().collect::<Vec<_>>(),
            vec![AccessLevel::Read, AccessLevel::Write, AccessLevel::Delete]
        );

        assert!(effective_levels(&doc, "carol", &[]).is_empty());
        assert!(effective_levels(&serde_json::json!({}), "alice", &groups).is_empty());
    }

    #[test]
    fn test_discovery_error_keeps_cancellation() {
        assert!(matches!(
            discovery_error("step", Error::Cancelled),
            Error::Cancelled
        ));
        assert!(matches!(
            discovery_error("step", Error::upstream(403, "denied")),
            Error::Discovery(_)
        ));
    }
}
