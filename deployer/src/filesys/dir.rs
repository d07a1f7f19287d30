//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::DeployerError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), DeployerError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), DeployerError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// Regular files directly inside the directory, sorted by name
    pub async fn list_files(&self) -> Result<Vec<PathBuf>, DeployerError> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }

    /// Copy every file under this directory to the same relative path under
    /// `destination`, keeping permission bits.
    ///
    /// Produces real files, not links: symlinks in the source are followed and
    /// their targets' content is written. Directories with no files in them
    /// are not recreated.
    pub async fn copy_tree_to(&self, destination: &Dir) -> Result<u64, DeployerError> {
        let source = self.path.clone();
        let destination = destination.path.clone();

        tokio::task::spawn_blocking(move || copy_tree(&source, &destination))
            .await
            .map_err(|e| DeployerError::Internal(format!("copy task: {}", e)))?
    }
}

fn copy_tree(source: &Path, destination: &Path) -> Result<u64, DeployerError> {
    let mut copied = 0;

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| DeployerError::IoError(e.into()))?;

        if entry.file_type().is_dir() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| DeployerError::Internal(e.to_string()))?;
        let target = destination.join(relative);

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // fs::copy follows symlinks and carries over permissions
        std::fs::copy(entry.path(), &target)?;
        debug!("copied {}", relative.display());
        copied += 1;
    }

    Ok(copied)
}
