//! Artefacts from a local directory

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::DeployerError;
use crate::resolver::ArtefactReader;

/// `file:<dir>`. Mostly for testing releases before they are published.
#[derive(Debug, Clone)]
pub struct LocalFileResolver {
    dir: PathBuf,
}

impl LocalFileResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn download_artefact(&self, filename: &str) -> Result<ArtefactReader, DeployerError> {
        let path = self.dir.join(filename);
        debug!("opening {}", path.display());

        let file = tokio::fs::File::open(&path).await?;
        Ok(Box::new(file))
    }
}
