//! GitHub API client
//!
//! Covers what deployer needs from GitHub: reading release assets when
//! resolving artefacts, and creating releases / uploading assets when
//! publishing.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use github_models::{ApiErrorResponse, Asset, CreateReleaseRequest, Release, RepoRef};
use reqwest::{Body, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::errors::DeployerError;
use crate::http::client::{status_error, HttpClient};
use crate::publish::host::{ReleaseHost, UploadOutcome};
use crate::resolver::ArtefactReader;
use crate::storage::settings::GithubSettings;

/// Authenticated GitHub client
#[derive(Debug)]
pub struct GithubClient {
    http: HttpClient,

    /// Asset uploads only. Bounded by the per-file upload timeout rather than
    /// the API request timeout.
    uploads: HttpClient,

    api_url: String,
    uploads_url: String,
    token: SecretString,
}

impl GithubClient {
    pub fn new(
        settings: &GithubSettings,
        token: SecretString,
        timeout: Duration,
        upload_timeout: Duration,
    ) -> Result<Self, DeployerError> {
        Ok(Self {
            http: HttpClient::new(timeout)?,
            uploads: HttpClient::new(upload_timeout)?,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            uploads_url: settings.uploads_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Authorization", format!("token {}", self.token.expose_secret())),
            ("X-GitHub-Api-Version", "2022-11-28".to_string()),
        ]
    }

    /// Assets of one release
    pub async fn list_assets_for_release(
        &self,
        repo: &RepoRef,
        release_id: u64,
    ) -> Result<Vec<Asset>, DeployerError> {
        let url = format!(
            "{}/repos/{}/{}/releases/{}",
            self.api_url, repo.owner, repo.name, release_id
        );

        let release: Release = self.http.get_json(&url, &self.auth_headers()).await?;
        debug!("release {} of {} has {} assets", release_id, repo, release.assets.len());

        Ok(release.assets)
    }

    /// Stream the binary content of an asset
    pub async fn download_asset(&self, asset: &Asset) -> Result<ArtefactReader, DeployerError> {
        let mut headers = self.auth_headers();
        headers.push(("Accept", "application/octet-stream".to_string()));

        self.http.get_stream(&asset.url, &headers).await
    }
}

#[async_trait]
impl ReleaseHost for GithubClient {
    // TODO: follow Link headers; only the first page (30 releases) is searched
    async fn list_releases(&self, repo: &RepoRef) -> Result<Vec<Release>, DeployerError> {
        let url = format!("{}/repos/{}/{}/releases", self.api_url, repo.owner, repo.name);
        self.http.get_json(&url, &self.auth_headers()).await
    }

    async fn create_release(
        &self,
        repo: &RepoRef,
        request: &CreateReleaseRequest,
    ) -> Result<Release, DeployerError> {
        let url = format!("{}/repos/{}/{}/releases", self.api_url, repo.owner, repo.name);
        self.http.post_json(&url, &self.auth_headers(), request).await
    }

    async fn upload_asset(
        &self,
        repo: &RepoRef,
        release_id: u64,
        file_path: &Path,
    ) -> Result<UploadOutcome, DeployerError> {
        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| DeployerError::Internal(format!("no filename in {}", file_path.display())))?;

        let mut url = url::Url::parse(&format!(
            "{}/repos/{}/{}/releases/{}/assets",
            self.uploads_url, repo.owner, repo.name, release_id
        ))
        .map_err(|e| DeployerError::ConfigError(format!("uploads URL: {}", e)))?;
        url.query_pairs_mut().append_pair("name", &name);

        let file = tokio::fs::File::open(file_path).await?;
        let size = file.metadata().await?.len();
        let body = Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .uploads
            .post_body(url.as_str(), &self.auth_headers(), "application/octet-stream", body, size)
            .await?;

        if response.status().is_success() {
            return Ok(UploadOutcome::Uploaded);
        }

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            let parsed: ApiErrorResponse = serde_json::from_str(&body).unwrap_or_default();
            if parsed.is_already_exists() {
                return Ok(UploadOutcome::AlreadyExists);
            }
            return Err(DeployerError::HttpStatus {
                url: url.to_string(),
                status: StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
                body,
            });
        }

        Err(status_error(url.as_str(), response).await)
    }
}
