//! GitHub REST API models
//!
//! Only the fields Deployer reads or writes are modelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// "owner/name"
    pub fn owner_slash_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A file attached to a release
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: u64,

    /// Filename, does not contain a path
    pub name: String,

    /// API URL for downloading the asset (needs `Accept: application/octet-stream`)
    pub url: String,

    #[serde(default)]
    pub size: u64,
}

/// A release as listed by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub tag_name: String,

    #[serde(default)]
    pub draft: bool,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// Body of `POST /repos/{owner}/{repo}/releases`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReleaseRequest {
    pub name: String,
    pub tag_name: String,
    pub target_commitish: String,
    pub draft: bool,
}

/// Error body returned by the API on 4xx responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub resource: String,

    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub field: String,
}

impl ApiErrorResponse {
    /// Uploading an asset whose name is taken yields a 422 with code `already_exists`
    pub fn is_already_exists(&self) -> bool {
        self.errors.iter().any(|e| e.code == "already_exists")
    }
}
