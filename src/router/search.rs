//! Pre-flight checks for `search/*` operations

use serde_json::Value;

use crate::operations::Params;
use crate::query::MAX_LIMIT;

const DATE_FIELDS: &[&str] = &["created", "lastModified"];
const CHECKSUM_TYPES: &[&str] = &["md5", "sha1", "sha256"];

/// Reject search parameter sets the deployment would refuse
///
/// Returns the problem as text; the router wraps it in
/// `Error::InvalidParameter`.
pub(super) fn validate_search_params(operation: &str, params: &Params) -> Result<(), String> {
    let has = |key: &str| params.get(key).is_some_and(|v| !v.is_null());

    match operation {
        "search/artifacts" => {
            if params.is_empty() {
                return Err("at least one search parameter required (name, repos, ...)".into());
            }
        }
        "search/property" => {
            let has_property = params
                .keys()
                .any(|key| key != "repos" && key != "recursive");
            if !has("p") && !has_property {
                return Err("property search requires property parameters (e.g. p=key=value)".into());
            }
        }
        "search/dates" => {
            if !has("from") && !has("to") {
                return Err("dates search requires 'from' or 'to' parameter".into());
            }
            if let Some(fields) = params.get("dateFields").and_then(Value::as_str) {
                if let Some(bad) = fields
                    .split(',')
                    .map(str::trim)
                    .find(|field| !DATE_FIELDS.contains(field))
                {
                    return Err(format!(
                        "invalid dateFields value: {bad} (must be 'created' or 'lastModified')"
                    ));
                }
            }
        }
        "search/buildArtifacts" if !has("buildName") => {
            return Err("buildArtifacts search requires 'buildName' parameter".into());
        }
        "search/dependency" if !has("sha1") => {
            return Err("dependency search requires 'sha1' parameter".into());
        }
        "search/usage" if !has("notUsedSince") && !has("createdBefore") => {
            return Err("usage search requires 'notUsedSince' or 'createdBefore' parameter".into());
        }
        "search/latestVersion" => {
            if !has("g") {
                return Err("latestVersion search requires 'g' (group) parameter".into());
            }
            if !has("a") {
                return Err("latestVersion search requires 'a' (artifact) parameter".into());
            }
        }
        "search/badChecksum" => {
            if let Some(kind) = params.get("type").and_then(Value::as_str) {
                if !CHECKSUM_TYPES.contains(&kind) {
                    return Err(format!(
                        "invalid checksum type: {kind} (must be md5, sha1, or sha256)"
                    ));
                }
            }
        }
        "search/license" if !has("license") && !has("approved") && !has("unknown") => {
            return Err("license search requires 'license', 'approved', or 'unknown' parameter".into());
        }
        "search/metadata" if !has("metadata") => {
            return Err("metadata search requires 'metadata' parameter".into());
        }
        "search/aql" => {
            for key in ["limit", "offset"] {
                if let Some(n) = numeric(params, key)? {
                    if n < 0 {
                        return Err(format!("{key} must not be negative, got {n}"));
                    }
                    if key == "limit" && n > MAX_LIMIT {
                        return Err(format!("limit {n} exceeds maximum {MAX_LIMIT}"));
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Integer parameter given as a number or numeric string
pub(super) fn numeric(params: &Params, key: &str) -> Result<Option<i64>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("{key} must be an integer, got {n}")),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("{key} must be an integer, got '{s}'")),
        Some(other) => Err(format!("{key} must be an integer, got {other}")),
    }
}
