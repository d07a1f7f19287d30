//! Command implementations

use std::path::Path;

use chrono::Local;
use github_models::RepoRef;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app::options::{upload_options, DeployOptions, ListOptions};
use crate::app::state::AppState;
use crate::catalog::store::Release;
use crate::deploy::docker::Orchestrator;
use crate::deploy::download::{Materializer, SpecSource};
use crate::deploy::init::{deployment_init, manifest_stub};
use crate::deploy::packager::make_package;
use crate::deploy::spec::{validate_user_config, UserConfig, VersionAndManifest};
use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::publish::release::{create_oci_image_release, Publisher, ReleaseRequest};

/// Release id that resolves to the newest release of the service's repository
pub const LATEST: &str = "latest";

/// How a release id given on the command line is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseRef {
    /// Looked up from the catalog
    Catalog(String),

    /// Newest release of the user config's repository
    Latest,

    /// `<artefactsLocation>#<specFilename>`, bypassing the catalog
    AdHoc(SpecSource),
}

impl ReleaseRef {
    pub fn parse(release_id: &str) -> Result<Self, DeployerError> {
        if release_id.is_empty() || release_id == LATEST {
            return Ok(ReleaseRef::Latest);
        }

        if !release_id.contains(':') {
            return Ok(ReleaseRef::Catalog(release_id.to_string()));
        }

        // "file:/tmp/build/#deployerspec.zip", "https://example.com/files/#deployerspec.zip"
        match release_id.split('#').collect::<Vec<_>>().as_slice() {
            [location, spec_filename] if !spec_filename.is_empty() => {
                Ok(ReleaseRef::AdHoc(SpecSource::new(*location, *spec_filename)))
            }
            _ => Err(DeployerError::InvalidLocation(format!(
                "expected <location>#<specFilename>; got {}",
                release_id
            ))),
        }
    }
}

/// Work out where the spec package of a release is
pub async fn resolve_spec_source(
    state: &AppState,
    release: &ReleaseRef,
    user_config: Option<&UserConfig>,
) -> Result<SpecSource, DeployerError> {
    let release = match release {
        ReleaseRef::AdHoc(source) => return Ok(source.clone()),
        ReleaseRef::Catalog(id) => {
            state.catalog.load_until_realtime().await?;
            state.catalog.by_id(id).await?
        }
        ReleaseRef::Latest => {
            let repository = user_config
                .map(|c| c.repository.as_str())
                .filter(|r| !r.is_empty())
                .ok_or_else(|| {
                    DeployerError::ConfigError(
                        "cannot resolve latest release ID when repository unset in user config".to_string(),
                    )
                })?;

            state.catalog.load_until_realtime().await?;
            let latest = state
                .catalog
                .latest_for_repository(repository)
                .await
                .ok_or_else(|| DeployerError::NotFound(format!("latest of {}", repository)))?;

            info!("latest release ID resolved to {}", latest.id);
            latest
        }
    };

    Ok(SpecSource::new(
        release.artefacts_location.clone(),
        release.spec_filename(),
    ))
}

async fn load_user_config(state: &AppState, service_id: &str) -> Result<UserConfig, DeployerError> {
    state
        .layout
        .service(service_id)?
        .user_config_file()
        .read_json_opt::<UserConfig>()
        .await?
        .ok_or_else(|| DeployerError::UserConfigNotFound(service_id.to_string()))
}

/// `deploy <serviceId> <releaseId>`
pub async fn deploy_internal(
    state: &AppState,
    orchestrator: &Orchestrator,
    service_id: &str,
    release_id: &str,
    options: &DeployOptions,
    cancel: CancellationToken,
) -> Result<(), DeployerError> {
    let service = state.layout.service(service_id)?;

    // the state directory is the only thing carried over between deploys
    if !options.keep_cache {
        service.work_dir().delete().await?;
    }

    let user_config = load_user_config(state, service_id).await?;

    let source = resolve_spec_source(state, &ReleaseRef::parse(release_id)?, Some(&user_config)).await?;

    let vam = Materializer::new(state.resolver_deps.clone())
        .download_release(&service.work_dir(), &source)
        .await?;

    let deployment = validate_user_config(&user_config, &vam)?;

    // docker would create a missing bind-mount source as root
    service.state_dir().create().await?;

    if options.interactive {
        orchestrator.interactive(&deployment, &service, cancel).await
    } else {
        orchestrator.deploy(&deployment, &service, cancel).await
    }
}

/// `releases dl <serviceId> <releaseId>`
pub async fn download_release(
    state: &AppState,
    service_id: &str,
    release_id: &str,
) -> Result<VersionAndManifest, DeployerError> {
    let service = state.layout.service(service_id)?;
    let user_config = service.user_config_file().read_json_opt::<UserConfig>().await?;

    let source = resolve_spec_source(state, &ReleaseRef::parse(release_id)?, user_config.as_ref()).await?;

    Materializer::new(state.resolver_deps.clone())
        .download_release(&service.work_dir(), &source)
        .await
}

/// `deployment-init <serviceId> <releaseId>`
pub async fn init_deployment(
    state: &AppState,
    service_id: &str,
    release_id: &str,
) -> Result<UserConfig, DeployerError> {
    let service = state.layout.service(service_id)?;
    let source = resolve_spec_source(state, &ReleaseRef::parse(release_id)?, None).await?;

    deployment_init(
        &state.layout,
        &service,
        &Materializer::new(state.resolver_deps.clone()),
        &source,
    )
    .await
}

/// `manifest-new`
pub fn print_manifest_stub() -> Result<(), DeployerError> {
    println!("{}", serde_json::to_string_pretty(&manifest_stub())?);
    Ok(())
}

/// `package <friendlyVersion> <outputZip>`
pub async fn package(friendly_version: &str, output: &Path) -> Result<(), DeployerError> {
    let source_dir = std::env::current_dir()?;
    make_package(friendly_version, &source_dir, output).await?;
    Ok(())
}

/// `releases ls`
pub async fn list_releases(state: &AppState, options: &ListOptions) -> Result<(), DeployerError> {
    state.catalog.load_until_realtime().await?;

    let mut releases = state.catalog.all_newest_first().await;
    if let Some(limit) = options.limit() {
        releases.truncate(limit);
    }

    print!("{}", render_release_table(&releases));
    Ok(())
}

/// One line of `releases ls`
#[derive(Debug, Tabled)]
struct ReleaseRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Repo")]
    repo: String,
    #[tabled(rename = "Ver")]
    version: String,
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Artefact location")]
    location: String,
}

impl From<&Release> for ReleaseRow {
    fn from(r: &Release) -> Self {
        Self {
            time: r.created.with_timezone(&Local).format("%b %d @ %H:%M").to_string(),
            repo: r.repository.clone(),
            version: r.revision_friendly.clone(),
            id: r.id.clone(),
            location: r.artefacts_location.clone(),
        }
    }
}

/// Releases as an aligned text table
pub fn render_release_table(releases: &[Release]) -> String {
    let mut table = Table::new(releases.iter().map(ReleaseRow::from));
    table.with(Style::blank());
    format!("{}\n", table)
}

/// `releases githubrelease-mk <owner> <repo> <releaseName> <revisionId> <assetsDir>`
pub async fn create_github_release(
    state: &AppState,
    request: &ReleaseRequest,
    assets_dir: &Path,
    cancel: CancellationToken,
) -> Result<Release, DeployerError> {
    let github = state.require_github()?;

    let publisher = Publisher::new(state.catalog.clone(), github, upload_options(&state.settings));
    let release = publisher
        .create_github_release(request, &Dir::new(assets_dir), &cancel)
        .await?;

    println!("Created release {} ({})", release.id, release.artefacts_location);
    Ok(release)
}

/// `releases ociimage-mk <imageRef> <owner> <repo> <releaseName> <revisionId>`
pub async fn create_oci_release(
    state: &AppState,
    image_ref: &str,
    request: &ReleaseRequest,
) -> Result<(), DeployerError> {
    if let Some(release) = create_oci_image_release(&state.catalog, image_ref, request).await? {
        println!("Created release {} ({})", release.id, release.artefacts_location);
    }
    Ok(())
}

/// Request for publishing `release_name` of `owner/repo`
pub fn release_request(owner: &str, repo: &str, release_name: &str, revision_id: &str) -> ReleaseRequest {
    ReleaseRequest {
        repo: RepoRef::new(owner, repo),
        release_name: release_name.to_string(),
        revision_id: revision_id.to_string(),
    }
}
