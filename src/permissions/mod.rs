//! Caller permissions and permission-based operation filtering

mod discoverer;

pub use discoverer::PermissionDiscoverer;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::operations::{HttpMethod, INTERNAL_PREFIX, OperationMapping, OperationRegistry};

/// Access granted on one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Read / list / download
    Read,
    /// Deploy / modify
    Write,
    /// Remove
    Delete,
    /// Manage the resource; implies every other level
    Admin,
}

impl AccessLevel {
    /// Every level
    pub const ALL: [Self; 4] = [Self::Read, Self::Write, Self::Delete, Self::Admin];
}

/// What one identity may do
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Permissions {
    /// Global administrator
    pub is_admin: bool,
    /// Profile fields as returned by the deployment
    pub identity: Map<String, Value>,
    /// Group memberships
    pub groups: Vec<String>,
    /// Access per repository key
    pub repository_access: BTreeMap<String, BTreeSet<AccessLevel>>,
}

impl Permissions {
    /// Account name, if the profile carried one
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.identity
            .get("name")
            .or_else(|| self.identity.get("username"))
            .and_then(Value::as_str)
    }

    /// Grant `level` on `resource`
    pub fn grant(&mut self, resource: &str, level: AccessLevel) {
        self.repository_access
            .entry(resource.to_string())
            .or_default()
            .insert(level);
    }

    /// Whether `level` is held on `resource`
    #[must_use]
    pub fn has_access(&self, resource: &str, level: AccessLevel) -> bool {
        self.is_admin
            || self
                .repository_access
                .get(resource)
                .is_some_and(|levels| levels.contains(&level) || levels.contains(&AccessLevel::Admin))
    }

    /// Whether `level` is held on at least one resource
    #[must_use]
    pub fn has_any(&self, level: AccessLevel) -> bool {
        self.is_admin
            || self
                .repository_access
                .values()
                .any(|levels| levels.contains(&level) || levels.contains(&AccessLevel::Admin))
    }
}

/// What an operation needs from the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessClass {
    /// Served in-process; always allowed
    Internal,
    /// Global administration
    Admin,
    /// Read-only
    Read,
    /// Creates or modifies content
    Write,
    /// Removes content
    Delete,
    /// Not recognizably read-only
    Unknown,
}

/// Namespaces whose operations act on repositories
const RESOURCE_NAMESPACES: &[&str] = &[
    "repos", "artifacts", "builds", "search", "docker", "packages",
];

/// Namespaces whose mutations are administrative
const SECURITY_NAMESPACES: &[&str] = &["users", "groups", "permissions", "tokens", "projects"];

const READ_ACTIONS: &[&str] = &[
    "list",
    "get",
    "download",
    "search",
    "info",
    "version",
    "ping",
    "storage",
    "runs",
    "status",
    "tags",
    "repositories",
    "stats",
];

const WRITE_ACTIONS: &[&str] = &[
    "upload", "create", "update", "copy", "move", "promote", "set", "sync",
];

/// Classify an operation by name and method
#[must_use]
pub fn access_class(name: &str, mapping: &OperationMapping) -> AccessClass {
    if name.starts_with(INTERNAL_PREFIX) || mapping.is_internal() {
        return AccessClass::Internal;
    }
    let (namespace, _) = name.split_once('/').unwrap_or((name, ""));
    let action = name.rsplit('/').next().unwrap_or(name);

    let mutating = !READ_ACTIONS.contains(&action);
    if name.contains("admin")
        || name == "system/configuration"
        || (namespace == "repos" && matches!(action, "create" | "update" | "delete"))
        || (SECURITY_NAMESPACES.contains(&namespace) && mutating)
    {
        return AccessClass::Admin;
    }

    if action == "delete" || action == "revoke" {
        AccessClass::Delete
    } else if WRITE_ACTIONS.contains(&action) {
        AccessClass::Write
    } else if READ_ACTIONS.contains(&action)
        || namespace == "search"
        || matches!(mapping.method, HttpMethod::Get | HttpMethod::Head)
    {
        AccessClass::Read
    } else {
        AccessClass::Unknown
    }
}

/// Whether `perms` allows the operation
#[must_use]
pub fn is_permitted(name: &str, mapping: &OperationMapping, perms: &Permissions) -> bool {
    let class = access_class(name, mapping);
    if perms.is_admin || class == AccessClass::Internal {
        return true;
    }
    let (namespace, _) = name.split_once('/').unwrap_or((name, ""));
    match class {
        AccessClass::Internal => true,
        AccessClass::Read => {
            !RESOURCE_NAMESPACES.contains(&namespace) || perms.has_any(AccessLevel::Read)
        }
        AccessClass::Write => perms.has_any(AccessLevel::Write),
        AccessClass::Delete => perms.has_any(AccessLevel::Delete),
        AccessClass::Admin | AccessClass::Unknown => false,
    }
}

/// Subset of `registry` the identity may invoke; `registry` is left untouched
#[must_use]
pub fn filter_operations_by_permissions(
    registry: &OperationRegistry,
    perms: &Permissions,
) -> OperationRegistry {
    let filtered = registry.filter(|name, mapping| is_permitted(name, mapping, perms));
    info!(
        total = registry.len(),
        allowed = filtered.len(),
        is_admin = perms.is_admin,
        "Filtered operations by permissions"
    );
    filtered
}
