//! Capability discovery: which features and operations a deployment offers
//!
//! A [`CapabilityReport`] is produced in one discovery pass and cached for a
//! TTL. Operations the report marks unavailable are answered with a
//! structured denial (see [`format_capability_error`]) instead of an error.

mod discoverer;

pub use discoverer::{CapabilityDiscoverer, FEATURES, FeatureProbe, PACKAGE_TYPES};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Availability verdict for one feature or operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Whether it can be used
    pub available: bool,
    /// Why not; present only when unavailable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable prerequisites, e.g. "Xray license"
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// Informational remark on an available capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Capability {
    /// Available, no remarks
    #[must_use]
    pub fn available() -> Self {
        Self {
            available: true,
            ..Self::default()
        }
    }

    /// Unavailable for `reason`
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Replace prerequisites
    #[must_use]
    pub fn with_required<S: AsRef<str>>(mut self, required: &[S]) -> Self {
        self.required = required.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Attach a note
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Result of one discovery pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReport {
    /// Verdict per operation name
    pub operations: BTreeMap<String, Capability>,
    /// Verdict per feature name
    pub features: BTreeMap<String, Capability>,
    /// When discovery ran
    pub timestamp: DateTime<Utc>,
    /// Served from cache
    pub cache_valid: bool,
}

impl CapabilityReport {
    /// Verdict for an operation, if the report covers it
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&Capability> {
        self.operations.get(name)
    }

    /// Whether the report marks the operation unavailable
    #[must_use]
    pub fn denies(&self, name: &str) -> Option<&Capability> {
        self.operation(name).filter(|c| !c.available)
    }

    /// Counts of available and unavailable operations, by reason category
    #[must_use]
    pub fn operations_summary(&self) -> OperationsSummary {
        let mut summary = OperationsSummary {
            total: self.operations.len(),
            ..OperationsSummary::default()
        };
        for capability in self.operations.values() {
            if capability.available {
                summary.available += 1;
                continue;
            }
            summary.unavailable += 1;
            let reason = capability.reason.as_deref().unwrap_or_default();
            let bucket = match ReasonCategory::of(reason) {
                ReasonCategory::License => &mut summary.unavailable_by_reason.license,
                ReasonCategory::Permission => &mut summary.unavailable_by_reason.permission,
                ReasonCategory::NotInstalled => &mut summary.unavailable_by_reason.not_installed,
                ReasonCategory::CloudOnly => &mut summary.unavailable_by_reason.cloud_only,
                ReasonCategory::Other => &mut summary.unavailable_by_reason.other,
            };
            *bucket += 1;
        }
        summary
    }
}

/// Operation counts in a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationsSummary {
    /// All operations
    pub total: usize,
    /// Available operations
    pub available: usize,
    /// Unavailable operations
    pub unavailable: usize,
    /// Unavailable operations per reason category
    pub unavailable_by_reason: ReasonBuckets,
}

/// Unavailable-operation counts per reason category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReasonBuckets {
    /// License missing
    pub license: usize,
    /// Caller lacks permission
    pub permission: usize,
    /// Component not installed
    pub not_installed: usize,
    /// Only offered in the cloud
    pub cloud_only: usize,
    /// Anything else
    pub other: usize,
}

/// Coarse classification of an unavailability reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCategory {
    /// Mentions a license
    License,
    /// Mentions a permission
    Permission,
    /// Component not installed
    NotInstalled,
    /// Cloud-only feature
    CloudOnly,
    /// Unrecognized
    Other,
}

impl ReasonCategory {
    /// Classify reason text; first matching category wins
    #[must_use]
    pub fn of(reason: &str) -> Self {
        let reason = reason.to_lowercase();
        if reason.contains("license") {
            Self::License
        } else if reason.contains("permission") {
            Self::Permission
        } else if reason.contains("not installed") {
            Self::NotInstalled
        } else if reason.contains("cloud-only") || reason.contains("cloud only") {
            Self::CloudOnly
        } else {
            Self::Other
        }
    }

    /// What the caller can do about it
    #[must_use]
    pub fn resolution(self) -> &'static str {
        match self {
            Self::License => "Upgrade your JFrog license to access this feature",
            Self::Permission => "Request appropriate permissions from your administrator",
            Self::NotInstalled => "Install and configure the required JFrog component",
            Self::CloudOnly => "This feature is only available in JFrog Cloud",
            Self::Other => "Contact your administrator to enable this feature",
        }
    }
}

/// Structured denial returned in place of a result for an unavailable operation
#[must_use]
pub fn format_capability_error(operation: &str, capability: &Capability) -> Value {
    let reason = capability.reason.clone().unwrap_or_default();
    json!({
        "error": "operation_unavailable",
        "operation": operation,
        "reason": reason,
        "required": capability.required,
        "resolution": ReasonCategory::of(&reason).resolution(),
    })
}
