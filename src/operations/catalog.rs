//! Default operation catalog for an Artifactory deployment

use super::{Handler, HttpMethod, OperationMapping, OperationRegistry};
use crate::Result;

use HttpMethod::{Delete, Get, Post, Put};

/// Every operation the router knows for Artifactory
///
/// # Errors
///
/// Returns `Error::Config` if two entries share a name.
pub fn artifactory() -> Result<OperationRegistry> {
    let mut registry = OperationRegistry::new();
    for (name, mapping) in entries() {
        registry.register(name, mapping)?;
    }
    Ok(registry)
}

fn op(id: &str, method: HttpMethod, path: &str) -> OperationMapping {
    OperationMapping::new(id, method, path)
}

#[allow(clippy::too_many_lines)]
fn entries() -> Vec<(&'static str, OperationMapping)> {
    vec![
        // Repositories
        (
            "repos/list",
            op("listRepositories", Get, "/api/repositories").optional(&["type", "packageType"]),
        ),
        (
            "repos/get",
            op("getRepository", Get, "/api/repositories/{repoKey}").required(&["repoKey"]),
        ),
        (
            "repos/create",
            op("createRepository", Put, "/api/repositories/{repoKey}")
                .required(&["repoKey", "rclass"])
                .optional(&[
                    "packageType",
                    "description",
                    "notes",
                    "includesPattern",
                    "excludesPattern",
                    "repoLayoutRef",
                ]),
        ),
        (
            "repos/update",
            op("updateRepository", Post, "/api/repositories/{repoKey}")
                .required(&["repoKey"])
                .optional(&["description", "notes", "includesPattern", "excludesPattern"]),
        ),
        (
            "repos/delete",
            op("deleteRepository", Delete, "/api/repositories/{repoKey}").required(&["repoKey"]),
        ),
        // Artifacts
        (
            "artifacts/upload",
            op("uploadArtifact", Put, "/{repoKey}/{itemPath}")
                .required(&["repoKey", "itemPath"])
                .optional(&["properties"]),
        ),
        (
            "artifacts/download",
            op("downloadArtifact", Get, "/{repoKey}/{itemPath}").required(&["repoKey", "itemPath"]),
        ),
        (
            "artifacts/info",
            op("getArtifactInfo", Get, "/api/storage/{repoKey}/{itemPath}")
                .required(&["repoKey", "itemPath"]),
        ),
        (
            "artifacts/copy",
            op(
                "copyArtifact",
                Post,
                "/api/copy/{srcRepoKey}/{srcItemPath}?to={targetRepoKey}/{targetItemPath}",
            )
            .required(&["srcRepoKey", "srcItemPath", "targetRepoKey", "targetItemPath"])
            .optional(&["dry", "suppressLayouts", "failFast"]),
        ),
        (
            "artifacts/move",
            op(
                "moveArtifact",
                Post,
                "/api/move/{srcRepoKey}/{srcItemPath}?to={targetRepoKey}/{targetItemPath}",
            )
            .required(&["srcRepoKey", "srcItemPath", "targetRepoKey", "targetItemPath"])
            .optional(&["dry", "suppressLayouts", "failFast"]),
        ),
        (
            "artifacts/delete",
            op("deleteArtifact", Delete, "/{repoKey}/{itemPath}").required(&["repoKey", "itemPath"]),
        ),
        (
            "artifacts/properties/set",
            op(
                "setArtifactProperties",
                Put,
                "/api/storage/{repoKey}/{itemPath}?properties={properties}",
            )
            .required(&["repoKey", "itemPath", "properties"])
            .optional(&["recursive"]),
        ),
        (
            "artifacts/properties/delete",
            op(
                "deleteArtifactProperties",
                Delete,
                "/api/storage/{repoKey}/{itemPath}?properties={properties}",
            )
            .required(&["repoKey", "itemPath", "properties"])
            .optional(&["recursive"]),
        ),
        // Builds
        (
            "builds/list",
            op("listBuilds", Get, "/api/build").optional(&["project"]),
        ),
        (
            "builds/get",
            op("getBuildInfo", Get, "/api/build/{buildName}/{buildNumber}")
                .required(&["buildName", "buildNumber"])
                .optional(&["project"]),
        ),
        (
            "builds/runs",
            op("getBuildRuns", Get, "/api/build/{buildName}")
                .required(&["buildName"])
                .optional(&["project"]),
        ),
        (
            "builds/upload",
            op("uploadBuildInfo", Put, "/api/build")
                .required(&["buildInfo"])
                .optional(&["project"]),
        ),
        (
            "builds/promote",
            op("promoteBuild", Post, "/api/build/promote/{buildName}/{buildNumber}")
                .required(&["buildName", "buildNumber", "targetRepo"])
                .optional(&[
                    "status",
                    "comment",
                    "ciUser",
                    "timestamp",
                    "copy",
                    "dependencies",
                    "scopes",
                    "properties",
                    "failFast",
                    "project",
                ]),
        ),
        (
            "builds/delete",
            op("deleteBuild", Delete, "/api/build/{buildName}")
                .required(&["buildName"])
                .optional(&["buildNumbers", "artifacts", "project", "deleteAll"]),
        ),
        // Search
        (
            "search/artifacts",
            op("searchArtifacts", Get, "/api/search/artifact").optional(&[
                "name",
                "repos",
                "includeRemote",
                "type",
                "size",
                "created",
                "modified",
                "lastDownloaded",
            ]),
        ),
        (
            "search/aql",
            op("searchAQL", Post, "/api/search/aql")
                .required(&["query"])
                .optional(&["limit", "offset"])
                .query_language(),
        ),
        (
            "search/gavc",
            op("searchGAVC", Get, "/api/search/gavc")
                .optional(&["g", "a", "v", "c", "repos", "recursive", "limit"]),
        ),
        (
            "search/property",
            op("searchByProperty", Get, "/api/search/prop").optional(&["p", "repos", "recursive"]),
        ),
        (
            "search/checksum",
            op("searchByChecksum", Get, "/api/search/checksum")
                .optional(&["md5", "sha1", "sha256", "repos"]),
        ),
        (
            "search/pattern",
            op("searchByPattern", Get, "/api/search/pattern")
                .required(&["pattern"])
                .optional(&["repos", "recursive"]),
        ),
        (
            "search/dates",
            op("searchByDates", Get, "/api/search/dates")
                .optional(&["dateFields", "from", "to", "repos"]),
        ),
        (
            "search/buildArtifacts",
            op("searchBuildArtifacts", Get, "/api/search/buildArtifacts")
                .optional(&["buildName", "buildNumber", "project", "repos"]),
        ),
        (
            "search/dependency",
            op("searchByDependency", Get, "/api/search/dependency").optional(&["sha1", "repos"]),
        ),
        (
            "search/usage",
            op("searchByUsage", Get, "/api/search/usage")
                .optional(&["notUsedSince", "createdBefore", "repos"]),
        ),
        (
            "search/latestVersion",
            op("searchLatestVersion", Get, "/api/search/latestVersion")
                .optional(&["g", "a", "v", "repos", "remote", "listFiles"]),
        ),
        (
            "search/stats",
            op("searchWithStats", Get, "/api/search/stats")
                .optional(&["name", "repos", "statsOnly"]),
        ),
        (
            "search/badChecksum",
            op("searchBadChecksum", Get, "/api/search/badChecksum").optional(&["type", "repos"]),
        ),
        (
            "search/license",
            op("searchByLicense", Get, "/api/search/license")
                .optional(&["license", "repos", "approved", "unknown"]),
        ),
        (
            "search/metadata",
            op("searchByMetadata", Get, "/api/search/metadata")
                .optional(&["metadata", "repos", "recursive"]),
        ),
        // System
        ("system/info", op("getSystemInfo", Get, "/api/system")),
        ("system/version", op("getVersion", Get, "/api/system/version")),
        ("system/storage", op("getStorageInfo", Get, "/api/storageinfo")),
        ("system/ping", op("ping", Get, "/api/system/ping")),
        (
            "system/configuration",
            op("getConfiguration", Get, "/api/system/configuration"),
        ),
        // Docker
        (
            "docker/repositories",
            op("listDockerRepositories", Get, "/api/docker/{repoKey}/v2/_catalog")
                .required(&["repoKey"])
                .optional(&["n", "last"]),
        ),
        (
            "docker/tags",
            op(
                "listDockerTags",
                Get,
                "/api/docker/{repoKey}/v2/{imagePath}/tags/list",
            )
            .required(&["repoKey", "imagePath"])
            .optional(&["n", "last"]),
        ),
        // Security: users, groups, permission targets, tokens
        ("users/list", op("listUsers", Get, "/api/security/users")),
        (
            "users/get",
            op("getUser", Get, "/api/security/users/{username}").required(&["username"]),
        ),
        (
            "users/create",
            op("createUser", Put, "/api/security/users/{username}")
                .required(&["username", "email", "password"])
                .optional(&["admin", "profileUpdatable", "groups"]),
        ),
        (
            "users/update",
            op("updateUser", Post, "/api/security/users/{username}")
                .required(&["username"])
                .optional(&["email", "password", "admin", "groups"]),
        ),
        (
            "users/delete",
            op("deleteUser", Delete, "/api/security/users/{username}").required(&["username"]),
        ),
        ("groups/list", op("listGroups", Get, "/api/security/groups")),
        (
            "groups/get",
            op("getGroup", Get, "/api/security/groups/{groupName}").required(&["groupName"]),
        ),
        (
            "groups/create",
            op("createGroup", Put, "/api/security/groups/{groupName}")
                .required(&["groupName"])
                .optional(&["description", "autoJoin", "adminPrivileges"]),
        ),
        (
            "groups/delete",
            op("deleteGroup", Delete, "/api/security/groups/{groupName}")
                .required(&["groupName"]),
        ),
        (
            "permissions/list",
            op("listPermissionTargets", Get, "/api/v2/security/permissions"),
        ),
        (
            "permissions/get",
            op(
                "getPermissionTarget",
                Get,
                "/api/v2/security/permissions/{permissionName}",
            )
            .required(&["permissionName"]),
        ),
        (
            "permissions/create",
            op(
                "createPermissionTarget",
                Put,
                "/api/v2/security/permissions/{permissionName}",
            )
            .required(&["permissionName"])
            .optional(&["repo", "build", "releaseBundle"]),
        ),
        (
            "permissions/delete",
            op(
                "deletePermissionTarget",
                Delete,
                "/api/v2/security/permissions/{permissionName}",
            )
            .required(&["permissionName"]),
        ),
        ("tokens/list", op("listTokens", Get, "/access/api/v1/tokens")),
        (
            "tokens/create",
            op("createToken", Post, "/access/api/v1/tokens")
                .optional(&["username", "scope", "expires_in", "refreshable", "description"]),
        ),
        (
            "tokens/revoke",
            op("revokeToken", Delete, "/access/api/v1/tokens/{tokenId}").required(&["tokenId"]),
        ),
        // Projects (Platform Pro / Enterprise)
        ("projects/list", op("listProjects", Get, "/access/api/v1/projects")),
        (
            "projects/get",
            op("getProject", Get, "/access/api/v1/projects/{projectKey}")
                .required(&["projectKey"]),
        ),
        (
            "projects/create",
            op("createProject", Post, "/access/api/v1/projects")
                .required(&["projectKey", "displayName"])
                .optional(&["description", "admin_privileges", "storage_quota_bytes"]),
        ),
        (
            "projects/update",
            op("updateProject", Put, "/access/api/v1/projects/{projectKey}")
                .required(&["projectKey"])
                .optional(&["displayName", "description", "admin_privileges"]),
        ),
        (
            "projects/delete",
            op("deleteProject", Delete, "/access/api/v1/projects/{projectKey}")
                .required(&["projectKey"]),
        ),
        // Xray
        (
            "xray/version",
            op("getXrayVersion", Get, "/xray/api/v1/system/version"),
        ),
        (
            "xray/summary/artifact",
            op("getArtifactSummary", Post, "/xray/api/v1/summary/artifact").required(&["paths"]),
        ),
        (
            "xray/scan/build",
            op("scanBuild", Post, "/xray/api/v1/scanBuild")
                .required(&["buildName", "buildNumber"])
                .optional(&["project"]),
        ),
        (
            "xray/violations",
            op("getViolations", Post, "/xray/api/v1/violations")
                .optional(&["filters", "pagination"]),
        ),
        // Federation
        (
            "federation/status",
            op("getFederationStatus", Get, "/api/federation/status"),
        ),
        (
            "federation/sync",
            op("syncFederatedRepository", Post, "/api/federation/fullSync/{repoKey}")
                .required(&["repoKey"]),
        ),
        // Packages
        (
            "packages/info",
            op("getPackageInfo", Get, "/api/storage/{repoKey}/{packagePath}")
                .required(&["repoKey", "packagePath"])
                .optional(&["properties", "lastModified", "statsOnly"]),
        ),
        (
            "packages/versions",
            op("listPackageVersions", Get, "/api/storage/{repoKey}/{packagePath}?list&deep=1")
                .required(&["repoKey", "packagePath"])
                .optional(&["depth", "listFolders", "mdTimestamps", "includeRootPath"]),
        ),
        (
            "packages/latest",
            op("getLatestPackageVersion", Get, "/api/storage/{repoKey}/{packagePath}?lastModified")
                .required(&["repoKey", "packagePath"]),
        ),
        (
            "packages/stats",
            op("getPackageStatistics", Get, "/api/storage/{repoKey}/{packagePath}?stats")
                .required(&["repoKey", "packagePath"]),
        ),
        (
            "packages/properties",
            op("getPackageProperties", Get, "/api/storage/{repoKey}/{packagePath}")
                .required(&["repoKey", "packagePath"])
                .optional(&["properties"]),
        ),
        (
            "packages/search",
            op("searchPackages", Get, "/api/search/artifact")
                .optional(&["name", "repos", "type", "packageType"]),
        ),
        (
            "packages/dependencies",
            op(
                "getPackageDependencies",
                Get,
                "/api/storage/{repoKey}/{packagePath}?properties=dependency.*",
            )
            .required(&["repoKey", "packagePath"]),
        ),
        (
            "packages/dependents",
            op("getPackageDependents", Get, "/api/search/dependency")
                .required(&["sha1"])
                .optional(&["repos"]),
        ),
        (
            "packages/maven/info",
            op("getMavenPackageInfo", Get, "/api/storage/{repoKey}/{groupId}/{artifactId}")
                .required(&["repoKey", "groupId", "artifactId"]),
        ),
        (
            "packages/maven/versions",
            op(
                "listMavenVersions",
                Get,
                "/api/storage/{repoKey}/{groupId}/{artifactId}?list&deep=1",
            )
            .required(&["repoKey", "groupId", "artifactId"]),
        ),
        (
            "packages/maven/pom",
            op(
                "getMavenPom",
                Get,
                "/{repoKey}/{groupId}/{artifactId}/{version}/{artifactId}-{version}.pom",
            )
            .required(&["repoKey", "groupId", "artifactId", "version"]),
        ),
        (
            "packages/npm/info",
            op("getNpmPackageInfo", Get, "/api/npm/{repoKey}/{packageName}")
                .required(&["repoKey", "packageName"]),
        ),
        (
            "packages/npm/versions",
            op("listNpmVersions", Get, "/api/storage/{repoKey}/{packageName}?list&deep=1")
                .required(&["repoKey", "packageName"]),
        ),
        (
            "packages/npm/tarball",
            op(
                "getNpmTarball",
                Get,
                "/{repoKey}/{packageName}/-/{packageName}-{version}.tgz",
            )
            .required(&["repoKey", "packageName", "version"]),
        ),
        (
            "packages/docker/info",
            op(
                "getDockerImageInfo",
                Get,
                "/api/docker/{repoKey}/v2/{imageName}/manifests/{tag}",
            )
            .required(&["repoKey", "imageName", "tag"]),
        ),
        (
            "packages/docker/tags",
            op("listDockerTags", Get, "/api/docker/{repoKey}/v2/{imageName}/tags/list")
                .required(&["repoKey", "imageName"])
                .optional(&["n", "last"]),
        ),
        (
            "packages/docker/layers",
            op("getDockerLayers", Get, "/api/storage/{repoKey}/{imageName}/{tag}?list&deep=1")
                .required(&["repoKey", "imageName", "tag"]),
        ),
        (
            "packages/pypi/info",
            op("getPypiPackageInfo", Get, "/api/pypi/{repoKey}/simple/{packageName}")
                .required(&["repoKey", "packageName"]),
        ),
        (
            "packages/pypi/versions",
            op("listPypiVersions", Get, "/api/storage/{repoKey}/{packageName}?list&deep=1")
                .required(&["repoKey", "packageName"]),
        ),
        (
            "packages/nuget/info",
            op(
                "getNugetPackageInfo",
                Get,
                "/api/nuget/{repoKey}/Packages(Id='{packageId}',Version='{version}')",
            )
            .required(&["repoKey", "packageId", "version"]),
        ),
        (
            "packages/nuget/versions",
            op(
                "listNugetVersions",
                Get,
                "/api/nuget/{repoKey}/FindPackagesById()?id='{packageId}'",
            )
            .required(&["repoKey", "packageId"]),
        ),
        // In-process helpers
        (
            "internal/current-user",
            OperationMapping::internal("getCurrentUser", Handler::CurrentUser),
        ),
        (
            "internal/available-features",
            OperationMapping::internal("getAvailableFeatures", Handler::AvailableFeatures),
        ),
    ]
}
