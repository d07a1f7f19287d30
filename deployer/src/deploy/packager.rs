//! Spec package creation

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

use crate::deploy::spec::{Version, VERSION_FILENAME};
use crate::errors::DeployerError;

/// Zip every file under `source_dir` into `output`, plus a generated `version.json`
pub async fn make_package(
    friendly_version: &str,
    source_dir: &Path,
    output: &Path,
) -> Result<usize, DeployerError> {
    let version = serde_json::to_vec_pretty(&Version {
        friendly_version: friendly_version.to_string(),
    })?;
    let source_dir = source_dir.to_path_buf();
    let output = output.to_path_buf();

    let count = tokio::task::spawn_blocking(move || write_package(&version, &source_dir, &output))
        .await
        .map_err(|e| DeployerError::Internal(format!("package task: {}", e)))??;

    info!("packaged {} files", count);
    Ok(count)
}

fn write_package(version: &[u8], source_dir: &Path, output: &Path) -> Result<usize, DeployerError> {
    let file = std::fs::File::create(output)?;
    // the output may live inside the tree being packaged
    let output_abs = std::fs::canonicalize(output)?;

    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    writer.start_file(VERSION_FILENAME, options)?;
    writer.write_all(version)?;

    let mut count = 0;
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| DeployerError::IoError(e.into()))?;
        if entry.file_type().is_dir() {
            continue;
        }

        if std::fs::canonicalize(entry.path())? == output_abs {
            continue;
        }

        let name = entry_name(source_dir, entry.path())?;
        if name == VERSION_FILENAME {
            warn!("skipping {}, it is generated", VERSION_FILENAME);
            continue;
        }

        debug!("adding {}", name);
        writer.start_file(name, options)?;
        let mut source = std::fs::File::open(entry.path())?;
        std::io::copy(&mut source, &mut writer)?;
        count += 1;
    }

    writer.finish()?;
    Ok(count)
}

/// Path inside the archive, always `/`-separated
fn entry_name(source_dir: &Path, path: &Path) -> Result<String, DeployerError> {
    let relative: PathBuf = path
        .strip_prefix(source_dir)
        .map_err(|e| DeployerError::Internal(e.to_string()))?
        .to_path_buf();

    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/"))
}
