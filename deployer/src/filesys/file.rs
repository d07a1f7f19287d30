//! File operations

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::errors::DeployerError;

/// A file wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, DeployerError> {
        let contents = fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&contents)?)
    }

    /// Read file as JSON, `None` if the file does not exist
    pub async fn read_json_opt<T: DeserializeOwned>(&self) -> Result<Option<T>, DeployerError> {
        match fs::read(&self.path).await {
            Ok(contents) => Ok(Some(serde_json::from_slice(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write JSON to file (pretty-printed, trailing newline)
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), DeployerError> {
        let mut contents = serde_json::to_vec_pretty(value)?;
        contents.push(b'\n');
        self.write_atomic(&mut contents.as_slice()).await
    }

    /// Stream `reader` into a sibling temp file, then rename it into place.
    ///
    /// Readers of `path` either see nothing or the complete content; a crash
    /// midway leaves only the temp file behind.
    pub async fn write_atomic<R>(&self, reader: &mut R) -> Result<(), DeployerError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let parent = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent).await?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = parent.join(format!(".{}.tmp-{}", file_name, uuid::Uuid::new_v4().simple()));

        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            tokio::io::copy(reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);

            fs::rename(&temp_path, &self.path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    /// Create an empty file, or truncate an existing one
    pub async fn touch(&self) -> Result<(), DeployerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::File::create(&self.path).await?;
        Ok(())
    }

    /// Delete the file
    pub async fn delete(&self) -> Result<(), DeployerError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
