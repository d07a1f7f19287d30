//! In-container bootstrap
//!
//! Runs as `/shim launch-via-shim -- <command...>` inside the deployer image.

use std::process::Command;

use tracing::debug;

use crate::deploy::docker::CONTAINER_WORK_DIR;
use crate::errors::DeployerError;
use crate::filesys::dir::Dir;

/// Where this executable is bind-mounted inside the container
pub const SHIM_BINARY_MOUNT_POINT: &str = "/shim";

/// Where the work directory is bind-mounted inside the container
pub const SHIM_WORK_COPY_DIR: &str = "/shim-work-copy";

/// Subcommand the container is started with
pub const SHIM_COMMAND: &str = "launch-via-shim";

/// Copy the mounted work tree to `/work`, then become `argv`.
///
/// Only returns on failure.
pub async fn launch_via_shim(argv: &[String]) -> Result<(), DeployerError> {
    launch(argv, &Dir::new(SHIM_WORK_COPY_DIR), &Dir::new(CONTAINER_WORK_DIR)).await
}

async fn launch(argv: &[String], source: &Dir, work_dir: &Dir) -> Result<(), DeployerError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| DeployerError::ShimError("no command given".to_string()))?;

    let copied = source
        .copy_tree_to(work_dir)
        .await
        .map_err(|e| DeployerError::ShimError(format!("copy files failed: {}", e)))?;
    debug!("shim copied {} files to {}", copied, work_dir.path().display());

    let mut command = Command::new(program);
    command.args(args);

    Err(exec(command, program))
}

#[cfg(unix)]
fn exec(mut command: Command, program: &str) -> DeployerError {
    use std::os::unix::process::CommandExt;

    // exec() only returns on error
    let err = command.exec();
    DeployerError::ShimError(format!("exec {} failed: {}", program, err))
}

/// No process replacement available: run the command as a child and exit
/// with its code.
#[cfg(not(unix))]
fn exec(mut command: Command, program: &str) -> DeployerError {
    match command.status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(err) => DeployerError::ShimError(format!("exec {} failed: {}", program, err)),
    }
}
