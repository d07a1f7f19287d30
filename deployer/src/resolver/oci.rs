//! Artefacts stored as layers of an OCI image
//!
//! Registry access goes through the `oras` CLI. The image manifest is fetched
//! once per resolver; each artefact is the layer whose title annotation
//! matches the requested filename, fetched by digest.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::errors::DeployerError;
use crate::resolver::ArtefactReader;

/// Annotation carrying a layer's original filename
pub const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciManifest {
    #[serde(default)]
    pub schema_version: i64,

    #[serde(default)]
    pub media_type: String,

    #[serde(default)]
    pub layers: Vec<OciLayer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciLayer {
    #[serde(default)]
    pub media_type: String,

    pub digest: String,

    #[serde(default)]
    pub size: u64,

    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl OciManifest {
    pub fn layer_by_title(&self, title: &str) -> Option<&OciLayer> {
        self.layers
            .iter()
            .find(|layer| layer.annotations.get(TITLE_ANNOTATION).map(String::as_str) == Some(title))
    }
}

/// Invokes the `oras` registry client
#[derive(Debug, Clone)]
pub struct OrasCli {
    pub binary: String,
    pub timeout: Duration,
}

impl Default for OrasCli {
    fn default() -> Self {
        Self {
            binary: "oras".to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl OrasCli {
    pub async fn manifest_fetch(&self, image_ref: &str) -> Result<OciManifest, DeployerError> {
        let stdout = self.run(&["manifest", "fetch", image_ref]).await?;

        serde_json::from_slice(&stdout).map_err(|e| {
            DeployerError::RegistryError(format!("manifest of {}: {}", image_ref, e))
        })
    }

    pub async fn blob_fetch(&self, blob_ref: &str) -> Result<Vec<u8>, DeployerError> {
        self.run(&["blob", "fetch", "--output=-", blob_ref]).await
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, DeployerError> {
        debug!("{} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| {
                DeployerError::Timeout(format!("{} {}", self.binary, args.join(" ")))
            })?
            .map_err(|e| {
                DeployerError::RegistryError(format!("failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            return Err(DeployerError::RegistryError(format!(
                "{} {}: {}: stdout[{}] stderr[{}]",
                self.binary,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stdout).trim(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(output.stdout)
    }
}

/// `docker://<image>:<tag>` or `oci://<image>:<tag>`
#[derive(Debug)]
pub struct OciResolver {
    image_ref: String,
    image_ref_without_tag: String,
    oras: OrasCli,
    manifest: OnceCell<OciManifest>,
}

impl OciResolver {
    pub fn new(image_ref: &str, oras: OrasCli) -> Result<Self, DeployerError> {
        // "ghcr.io:443/org/app:v1" => ("ghcr.io:443/org/app", "v1")
        let image_ref_without_tag = match image_ref.rsplit_once(':') {
            Some((image, tag)) if !image.is_empty() && !tag.is_empty() && !tag.contains('/') => {
                image.to_string()
            }
            _ => {
                return Err(DeployerError::InvalidLocation(format!(
                    "expected image reference to be <image>:<tag>; got {}",
                    image_ref
                )))
            }
        };

        Ok(Self {
            image_ref: image_ref.to_string(),
            image_ref_without_tag,
            oras,
            manifest: OnceCell::new(),
        })
    }

    pub fn image_ref(&self) -> &str {
        &self.image_ref
    }

    async fn manifest(&self) -> Result<&OciManifest, DeployerError> {
        self.manifest
            .get_or_try_init(|| self.oras.manifest_fetch(&self.image_ref))
            .await
    }

    pub async fn download_artefact(&self, filename: &str) -> Result<ArtefactReader, DeployerError> {
        let layer = self
            .manifest()
            .await?
            .layer_by_title(filename)
            .ok_or_else(|| DeployerError::LayerNotFound {
                filename: filename.to_string(),
                image_ref: self.image_ref.clone(),
            })?;

        let blob_ref = format!("{}@{}", self.image_ref_without_tag, layer.digest);
        let blob = self.oras.blob_fetch(&blob_ref).await?;

        Ok(Box::new(std::io::Cursor::new(blob)))
    }

    #[cfg(test)]
    fn with_manifest(self, manifest: OciManifest) -> Self {
        let _ = self.manifest.set(manifest);
        self
    }
}
