//! Release publishing tests against an in-memory release host

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use github_models::{CreateReleaseRequest, Release as HostRelease, RepoRef};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use deployer::catalog::eventlog::MemoryEventLog;
use deployer::catalog::store::ReleaseCatalog;
use deployer::errors::DeployerError;
use deployer::filesys::dir::Dir;
use deployer::publish::upload::Options;
use deployer::publish::{Publisher, ReleaseHost, ReleaseRequest, UploadOutcome};
use deployer::utils::CooldownOptions;
use deployer_events::SOFTWARE_RELEASES_STREAM;

#[derive(Default)]
struct FakeHost {
    releases: Mutex<Vec<HostRelease>>,
    uploaded: Mutex<Vec<String>>,
    failing: HashSet<String>,
    already_there: HashSet<String>,
}

impl FakeHost {
    fn failing(name: &str) -> Self {
        Self {
            failing: [name.to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    fn with_existing(name: &str) -> Self {
        Self {
            already_there: [name.to_string()].into_iter().collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ReleaseHost for FakeHost {
    async fn list_releases(&self, _repo: &RepoRef) -> Result<Vec<HostRelease>, DeployerError> {
        Ok(self.releases.lock().await.clone())
    }

    async fn create_release(
        &self,
        _repo: &RepoRef,
        request: &CreateReleaseRequest,
    ) -> Result<HostRelease, DeployerError> {
        let mut releases = self.releases.lock().await;
        let release = HostRelease {
            id: 1000 + releases.len() as u64,
            name: Some(request.name.clone()),
            tag_name: request.tag_name.clone(),
            draft: request.draft,
            created_at: None,
            assets: vec![],
        };
        releases.push(release.clone());
        Ok(release)
    }

    async fn upload_asset(
        &self,
        _repo: &RepoRef,
        _release_id: u64,
        file_path: &Path,
    ) -> Result<UploadOutcome, DeployerError> {
        let name = file_path.file_name().unwrap().to_string_lossy().to_string();

        if self.failing.contains(&name) {
            return Err(DeployerError::HttpStatus {
                url: format!("https://uploads.example.com/{}", name),
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        if self.already_there.contains(&name) {
            return Ok(UploadOutcome::AlreadyExists);
        }

        self.uploaded.lock().await.push(name);
        Ok(UploadOutcome::Uploaded)
    }
}

fn options() -> Options {
    Options {
        concurrency: 2,
        per_file_timeout: Duration::from_millis(300),
        cooldown: CooldownOptions {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
        },
    }
}

fn request(revision_id: &str) -> ReleaseRequest {
    ReleaseRequest {
        repo: RepoRef::new("function61", "coolproduct"),
        release_name: "20200219_1609_9c39d027".to_string(),
        revision_id: revision_id.to_string(),
    }
}

fn assets_dir(names: &[&str]) -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    for name in names {
        std::fs::write(tmp.path().join(name), format!("content of {}", name)).unwrap();
    }
    tmp
}

#[tokio::test]
async fn test_all_uploads_succeed() {
    let log = Arc::new(MemoryEventLog::new());
    let catalog = Arc::new(ReleaseCatalog::new(log.clone()));
    let host = Arc::new(FakeHost::default());
    let assets = assets_dir(&["deployerspec.zip", "site.tar.gz", "lambda.zip"]);

    let publisher = Publisher::new(catalog.clone(), host.clone(), options());
    let release = publisher
        .create_github_release(&request("9c39d027"), &Dir::new(assets.path()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(release.repository, "function61/coolproduct");
    assert_eq!(release.artefacts_location, "githubrelease:function61:coolproduct:1000");
    assert_eq!(release.spec_filename(), "deployerspec.zip");

    let mut uploaded = host.uploaded.lock().await.clone();
    uploaded.sort();
    assert_eq!(uploaded, vec!["deployerspec.zip", "lambda.zip", "site.tar.gz"]);

    assert_eq!(log.lines(SOFTWARE_RELEASES_STREAM).await.len(), 1);
    assert!(host.releases.lock().await[0].draft);
}

#[tokio::test]
async fn test_failed_upload_records_nothing() {
    let log = Arc::new(MemoryEventLog::new());
    let catalog = Arc::new(ReleaseCatalog::new(log.clone()));
    let host = Arc::new(FakeHost::failing("site.tar.gz"));
    let assets = assets_dir(&["deployerspec.zip", "site.tar.gz"]);

    let publisher = Publisher::new(catalog.clone(), host, options());
    let result = publisher
        .create_github_release(&request("9c39d027"), &Dir::new(assets.path()), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(DeployerError::UploadFailed { .. })));
    assert!(log.lines(SOFTWARE_RELEASES_STREAM).await.is_empty());
    assert!(!catalog.has_revision_id("9c39d027").await);
}

#[tokio::test]
async fn test_existing_asset_counts_as_success() {
    let log = Arc::new(MemoryEventLog::new());
    let catalog = Arc::new(ReleaseCatalog::new(log.clone()));
    let host = Arc::new(FakeHost::with_existing("deployerspec.zip"));
    let assets = assets_dir(&["deployerspec.zip", "site.tar.gz"]);

    let publisher = Publisher::new(catalog, host.clone(), options());
    publisher
        .create_github_release(&request("9c39d027"), &Dir::new(assets.path()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(host.uploaded.lock().await.clone(), vec!["site.tar.gz"]);
    assert_eq!(log.lines(SOFTWARE_RELEASES_STREAM).await.len(), 1);
}

#[tokio::test]
async fn test_known_revision_is_rejected() {
    let catalog = Arc::new(ReleaseCatalog::new(Arc::new(MemoryEventLog::new())));
    let host = Arc::new(FakeHost::default());
    let assets = assets_dir(&["deployerspec.zip"]);
    let publisher = Publisher::new(catalog, host.clone(), options());

    publisher
        .create_github_release(&request("9c39d027"), &Dir::new(assets.path()), &CancellationToken::new())
        .await
        .unwrap();

    let again = publisher
        .create_github_release(&request("9c39d027"), &Dir::new(assets.path()), &CancellationToken::new())
        .await;
    assert!(matches!(again, Err(DeployerError::AlreadyPublished(rev)) if rev == "9c39d027"));
    assert_eq!(host.uploaded.lock().await.len(), 1);
}

#[tokio::test]
async fn test_rerun_reuses_remote_release() {
    let host = Arc::new(FakeHost::default());
    host.create_release(
        &RepoRef::new("function61", "coolproduct"),
        &CreateReleaseRequest {
            name: "20200219_1609_9c39d027".to_string(),
            tag_name: "20200219_1609_9c39d027".to_string(),
            target_commitish: "9c39d027".to_string(),
            draft: true,
        },
    )
    .await
    .unwrap();

    let catalog = Arc::new(ReleaseCatalog::new(Arc::new(MemoryEventLog::new())));
    let assets = assets_dir(&["deployerspec.zip"]);
    let publisher = Publisher::new(catalog, host.clone(), options());

    let release = publisher
        .create_github_release(&request("9c39d027"), &Dir::new(assets.path()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(host.releases.lock().await.len(), 1);
    assert_eq!(release.artefacts_location, "githubrelease:function61:coolproduct:1000");
}

#[tokio::test]
async fn test_cancelled_upload() {
    let catalog = Arc::new(ReleaseCatalog::new(Arc::new(MemoryEventLog::new())));
    let host = Arc::new(FakeHost::default());
    let assets = assets_dir(&["deployerspec.zip"]);
    let publisher = Publisher::new(catalog.clone(), host, options());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = publisher
        .create_github_release(&request("9c39d027"), &Dir::new(assets.path()), &cancel)
        .await;
    assert!(matches!(result, Err(DeployerError::Cancelled(_))));
    assert!(catalog.all().await.is_empty());
}
