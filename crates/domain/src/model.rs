//! Wire models shared between the catalog and the API surface.
//!
//! These serialize to the documented JSON shapes. Timestamps are unix
//! seconds, emitted as integers.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Package
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub owner: String,
    pub repo: String,
    pub full_name: String,
    pub description: String,
    pub topics: Vec<String>,
    pub license: String,
    pub homepage: String,
    pub github_url: String,
    pub stargazers_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub private: bool,
}

/// Reduced package shape used by search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSummary {
    pub owner: String,
    pub repo: String,
    pub full_name: String,
    pub description: String,
    pub stargazers_count: i64,
    pub updated_at: i64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Release
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Server-relative download path for a release archive.
pub fn download_path(owner: &str, repo: &str, tag: &str) -> String {
    format!("/api/v1/packages/{owner}/{repo}/download/{tag}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: i64,
    pub tag_name: String,
    pub name: String,
    pub body: String,
    pub draft: bool,
    pub prerelease: bool,
    pub created_at: i64,
    pub published_at: Option<i64>,
    pub tarball_url: String,
    pub zipball_url: String,
    pub download_url: String,
    pub file_size: i64,
    pub sha256: String,
}

/// Tag listing entry (release subset, forge tag shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagEntry {
    pub name: String,
    pub tarball_url: String,
    pub zipball_url: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Alias
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alias {
    pub short_name: String,
    pub full_name: String,
    pub owner: String,
    pub repo: String,
    pub created_at: i64,
    pub created_by: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Aggregates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stats {
    pub total_packages: i64,
    pub total_releases: i64,
    pub total_downloads: i64,
    pub downloads_today: i64,
}

/// Capability flags advertised by `/api/v1/registry/config` and the health
/// document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegistryFeatures {
    pub publish: bool,
    pub search: bool,
    pub aliases: bool,
    pub discovery: bool,
    pub federated_auth: bool,
}
