//! Spec package download and auxiliary artefacts
//!
//! Turns "a release lives at location X" into a populated work directory:
//! the spec package extracted, its manifest validated and every artefact the
//! manifest asks for downloaded next to it.

use tracing::info;

use crate::deploy::extract::extract_zip;
use crate::deploy::spec::{load_version_and_manifest, VersionAndManifest};
use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::resolver::{ArtefactResolver, ResolverDeps};
use crate::utils::sha256_hex;

/// Where a release's spec package is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSource {
    pub artefacts_location: String,
    pub spec_filename: String,
}

impl SpecSource {
    pub fn new(artefacts_location: impl Into<String>, spec_filename: impl Into<String>) -> Self {
        Self {
            artefacts_location: artefacts_location.into(),
            spec_filename: spec_filename.into(),
        }
    }
}

/// Downloads and extracts spec packages into a service's work directory
pub struct Materializer {
    deps: ResolverDeps,
}

impl Materializer {
    pub fn new(deps: ResolverDeps) -> Self {
        Self { deps }
    }

    /// Marks a work directory as fully downloaded for one spec package.
    ///
    /// Keyed on the spec filename only; republishing different content under
    /// the same filename is not detected.
    pub fn all_downloaded_flag(work_dir: &Dir, spec_filename: &str) -> File {
        work_dir.file(&format!(
            "_all-downloaded.{}.flag",
            sha256_hex(spec_filename.as_bytes())
        ))
    }

    /// Make sure `work_dir` holds the extracted spec and all its artefacts
    pub async fn download_release(
        &self,
        work_dir: &Dir,
        source: &SpecSource,
    ) -> Result<VersionAndManifest, DeployerError> {
        let flag = Self::all_downloaded_flag(work_dir, &source.spec_filename);
        if flag.exists().await {
            info!("{} already downloaded", source.spec_filename);
            return load_version_and_manifest(work_dir).await;
        }

        info!("artefacts source: {}", source.artefacts_location);
        let resolver = ArtefactResolver::from_uri(&source.artefacts_location, &self.deps)?;

        let vam = self.extract_spec(&resolver, work_dir, &source.spec_filename).await?;

        for filename in &vam.manifest.download_artefacts {
            self.download_auxiliary(&resolver, work_dir, &vam, filename).await?;
        }

        flag.touch().await?;
        Ok(vam)
    }

    /// Download and extract only the spec package, without auxiliary artefacts
    pub async fn download_spec(
        &self,
        work_dir: &Dir,
        source: &SpecSource,
    ) -> Result<VersionAndManifest, DeployerError> {
        let resolver = ArtefactResolver::from_uri(&source.artefacts_location, &self.deps)?;
        self.extract_spec(&resolver, work_dir, &source.spec_filename).await
    }

    async fn extract_spec(
        &self,
        resolver: &ArtefactResolver,
        work_dir: &Dir,
        spec_filename: &str,
    ) -> Result<VersionAndManifest, DeployerError> {
        info!("downloading {}", spec_filename);
        let mut spec = resolver.download_artefact(spec_filename).await?;

        work_dir.create().await?;

        info!("extracting {}", spec_filename);
        extract_zip(&mut spec, work_dir).await?;

        load_version_and_manifest(work_dir).await
    }

    async fn download_auxiliary(
        &self,
        resolver: &ArtefactResolver,
        work_dir: &Dir,
        vam: &VersionAndManifest,
        filename: &str,
    ) -> Result<(), DeployerError> {
        if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
            return Err(DeployerError::PathTraversal(filename.to_string()));
        }

        info!("downloading {}", filename);

        let local = work_dir.file(filename);
        if local.exists().await {
            info!("  already downloaded");
            return Ok(());
        }

        let template = &vam.manifest.download_artefact_url_template;

        let mut content = if template.is_empty() {
            resolver.download_artefact(filename).await?
        } else {
            let url = artefact_url(template, &vam.version.friendly_version, filename);
            self.deps.http.get_stream(&url, &[]).await?
        };

        local.write_atomic(&mut content).await
    }
}

/// Substitute `{version}` and `{filename}` into a URL template
pub fn artefact_url(template: &str, friendly_version: &str, filename: &str) -> String {
    template
        .replace("{version}", friendly_version)
        .replace("{filename}", filename)
}
