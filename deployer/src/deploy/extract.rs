//! Spec package extraction

use std::io::Cursor;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;

/// Extract a zip archive into `destination`, returning the number of files written.
///
/// Directory entries are skipped, so empty directories are not recreated.
/// Existing files are overwritten. Any entry whose name contains `..` or is
/// absolute aborts the extraction.
pub async fn extract_zip<R>(reader: &mut R, destination: &Dir) -> Result<usize, DeployerError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    // the zip central directory is at the end, so the archive is buffered first
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;

    let destination = destination.path().to_path_buf();

    tokio::task::spawn_blocking(move || extract_zip_blocking(buf, &destination))
        .await
        .map_err(|e| DeployerError::Internal(format!("extract task: {}", e)))?
}

fn extract_zip_blocking(buf: Vec<u8>, destination: &Path) -> Result<usize, DeployerError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(buf))?;

    // reject the whole archive before anything is written
    for name in archive.file_names() {
        entry_path(destination, name)?;
    }

    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();

        let target = entry_path(destination, &name)?;

        if entry.is_dir() {
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::File::create(&target)?;
        std::io::copy(&mut entry, &mut file)?;

        debug!("extracted {}", name);
        extracted += 1;
    }

    Ok(extracted)
}

fn entry_path(destination: &Path, name: &str) -> Result<PathBuf, DeployerError> {
    if name.contains("..") || name.starts_with('/') || name.starts_with('\\') {
        return Err(DeployerError::PathTraversal(name.to_string()));
    }

    Ok(destination.join(name))
}
