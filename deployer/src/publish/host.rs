//! Release hosting API

use std::path::Path;

use async_trait::async_trait;
use github_models::{CreateReleaseRequest, Release, RepoRef};

use crate::errors::DeployerError;

/// Result of a successful asset upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,

    /// An asset with the same name was already attached to the release
    AlreadyExists,
}

/// Where releases and their assets are published
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    async fn list_releases(&self, repo: &RepoRef) -> Result<Vec<Release>, DeployerError>;

    async fn create_release(
        &self,
        repo: &RepoRef,
        request: &CreateReleaseRequest,
    ) -> Result<Release, DeployerError>;

    async fn upload_asset(
        &self,
        repo: &RepoRef,
        release_id: u64,
        file_path: &Path,
    ) -> Result<UploadOutcome, DeployerError>;
}
