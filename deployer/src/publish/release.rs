//! Release creation
//!
//! The catalog is written last: a release becomes visible only once all of
//! its assets are uploaded. Re-running after a failure reuses the remote
//! release with the same name and skips assets that already made it.

use std::sync::Arc;

use chrono::Utc;
use deployer_events::{Event, EventMeta, ReleaseCreated};
use github_models::{CreateReleaseRequest, RepoRef};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::store::{Release, ReleaseCatalog, DEFAULT_SPEC_FILENAME};
use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::publish::host::ReleaseHost;
use crate::publish::upload::{self, upload_artefacts};
use crate::resolver::GithubReleaseResolver;
use crate::utils::generate_release_id;

/// What to publish
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub repo: RepoRef,

    /// Becomes both the release name and its tag
    pub release_name: String,

    /// Commit the release was built from
    pub revision_id: String,
}

/// Publishes releases to a release host and records them in the catalog
pub struct Publisher {
    catalog: Arc<ReleaseCatalog>,
    host: Arc<dyn ReleaseHost>,
    options: upload::Options,
}

impl Publisher {
    pub fn new(catalog: Arc<ReleaseCatalog>, host: Arc<dyn ReleaseHost>, options: upload::Options) -> Self {
        Self {
            catalog,
            host,
            options,
        }
    }

    /// Create (or reuse) a remote release, upload `assets_dir` into it and record it
    pub async fn create_github_release(
        &self,
        request: &ReleaseRequest,
        assets_dir: &Dir,
        cancel: &CancellationToken,
    ) -> Result<Release, DeployerError> {
        self.catalog.load_until_realtime().await?;

        // check-then-append is not atomic against other publishers
        if self.catalog.has_revision_id(&request.revision_id).await {
            return Err(DeployerError::AlreadyPublished(request.revision_id.clone()));
        }

        let release_id = self.find_or_create_release(request).await?;

        let summary = upload_artefacts(
            self.host.clone(),
            &request.repo,
            release_id,
            assets_dir,
            &self.options,
            cancel,
        )
        .await?;
        info!(
            "uploaded {} assets ({} already present)",
            summary.uploaded, summary.already_existed
        );

        let id = generate_release_id();
        self.catalog
            .append(&[Event::ReleaseCreated(
                ReleaseCreated {
                    id: id.clone(),
                    repository: request.repo.owner_slash_name(),
                    revision_friendly: request.release_name.clone(),
                    revision_id: request.revision_id.clone(),
                    artefacts_location: GithubReleaseResolver::location(&request.repo, release_id),
                    deployer_spec_filename: DEFAULT_SPEC_FILENAME.to_string(),
                },
                EventMeta::system_user(Utc::now()),
            )])
            .await?;

        self.catalog.by_id(&id).await
    }

    async fn find_or_create_release(&self, request: &ReleaseRequest) -> Result<u64, DeployerError> {
        let existing = self.host.list_releases(&request.repo).await?;

        if let Some(release) = existing
            .iter()
            .find(|r| r.name.as_deref() == Some(request.release_name.as_str()))
        {
            info!("reusing existing release {} ({})", request.release_name, release.id);
            return Ok(release.id);
        }

        let created = self
            .host
            .create_release(
                &request.repo,
                &CreateReleaseRequest {
                    name: request.release_name.clone(),
                    tag_name: request.release_name.clone(),
                    target_commitish: request.revision_id.clone(),
                    draft: true,
                },
            )
            .await?;

        info!("created release {} ({})", request.release_name, created.id);
        Ok(created.id)
    }
}

/// Record a release whose artefacts are layers of an already pushed image.
///
/// Returns `None` when the revision is already recorded.
pub async fn create_oci_image_release(
    catalog: &ReleaseCatalog,
    image_ref: &str,
    request: &ReleaseRequest,
) -> Result<Option<Release>, DeployerError> {
    catalog.load_until_realtime().await?;

    if catalog.has_revision_id(&request.revision_id).await {
        warn!("already have revision {}", request.revision_id);
        return Ok(None);
    }

    let id = generate_release_id();
    catalog
        .append(&[Event::ReleaseCreated(
            ReleaseCreated {
                id: id.clone(),
                repository: request.repo.owner_slash_name(),
                revision_friendly: request.release_name.clone(),
                revision_id: request.revision_id.clone(),
                artefacts_location: format!("docker://{}", image_ref),
                deployer_spec_filename: String::new(),
            },
            EventMeta::system_user(Utc::now()),
        )])
        .await?;

    Ok(Some(catalog.by_id(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::eventlog::MemoryEventLog;

    fn request(revision_id: &str) -> ReleaseRequest {
        ReleaseRequest {
            repo: RepoRef::new("function61", "coolproduct"),
            release_name: "20200219_1609_9c39d027".to_string(),
            revision_id: revision_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_oci_release_is_noop_for_known_revision() {
        let catalog = ReleaseCatalog::new(Arc::new(MemoryEventLog::new()));

        let created = create_oci_image_release(&catalog, "ghcr.io/function61/coolproduct:v1", &request("rev1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.artefacts_location, "docker://ghcr.io/function61/coolproduct:v1");
        assert_eq!(created.repository, "function61/coolproduct");

        assert!(create_oci_image_release(&catalog, "ghcr.io/function61/coolproduct:v2", &request("rev1"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(catalog.all().await.len(), 1);
    }
}
