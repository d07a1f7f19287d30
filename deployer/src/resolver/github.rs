//! Artefacts attached to a GitHub release

use std::sync::Arc;

use github_models::{Asset, RepoRef};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::errors::DeployerError;
use crate::http::github::GithubClient;
use crate::resolver::ArtefactReader;

/// `githubrelease:<owner>:<repo>:<releaseId>`
///
/// The release's asset listing is fetched once, on the first download, and
/// shared by all later downloads through this resolver.
#[derive(Debug)]
pub struct GithubReleaseResolver {
    repo: RepoRef,
    release_id: u64,
    client: Option<Arc<GithubClient>>,
    assets: OnceCell<Vec<Asset>>,
}

impl GithubReleaseResolver {
    pub fn parse(uri: &str, client: Option<Arc<GithubClient>>) -> Result<Self, DeployerError> {
        let components: Vec<&str> = uri.split(':').collect();
        if components.len() != 4 {
            return Err(DeployerError::InvalidLocation(format!(
                "invalid syntax for githubrelease location, got {} components: {}",
                components.len(),
                uri
            )));
        }

        if components[0] != "githubrelease" {
            return Err(DeployerError::InvalidLocation(format!(
                "expecting githubrelease; got '{}'",
                components[0]
            )));
        }

        let release_id = components[3].parse::<u64>().map_err(|e| {
            DeployerError::InvalidLocation(format!("release ID '{}': {}", components[3], e))
        })?;

        Ok(Self {
            repo: RepoRef::new(components[1], components[2]),
            release_id,
            client,
            assets: OnceCell::new(),
        })
    }

    /// Location string for a release, the inverse of [`GithubReleaseResolver::parse`]
    pub fn location(repo: &RepoRef, release_id: u64) -> String {
        format!("githubrelease:{}:{}:{}", repo.owner, repo.name, release_id)
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    pub fn release_id(&self) -> u64 {
        self.release_id
    }

    fn client(&self) -> Result<&GithubClient, DeployerError> {
        self.client.as_deref().ok_or_else(|| {
            DeployerError::ConfigError(format!(
                "GITHUB_TOKEN not set, needed to download from {}",
                self.repo
            ))
        })
    }

    async fn assets(&self) -> Result<&[Asset], DeployerError> {
        let client = self.client()?;

        let assets = self
            .assets
            .get_or_try_init(|| async {
                debug!("listing assets of release {} of {}", self.release_id, self.repo);
                client.list_assets_for_release(&self.repo, self.release_id).await
            })
            .await?;

        Ok(assets)
    }

    pub async fn download_artefact(&self, filename: &str) -> Result<ArtefactReader, DeployerError> {
        let asset = self
            .assets()
            .await?
            .iter()
            .find(|asset| asset.name == filename)
            .ok_or_else(|| DeployerError::AssetNotFound(filename.to_string()))?;

        self.client()?.download_asset(asset).await
    }
}
