//! Docker deployment executor
//!
//! Runs a validated deployment's command inside its deployer image. The work
//! directory is not mounted at `/work` directly: it is mounted at
//! [`SHIM_WORK_COPY_DIR`] together with this executable at
//! [`SHIM_BINARY_MOUNT_POINT`], and the container starts the shim, which copies
//! the tree into `/work` before exec'ing the real command. Tools that resolve
//! symlinks (Terraform, for one) misbehave on bind-mounted work trees.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deploy::shim::{SHIM_BINARY_MOUNT_POINT, SHIM_COMMAND, SHIM_WORK_COPY_DIR};
use crate::deploy::spec::Deployment;
use crate::errors::DeployerError;
use crate::storage::layout::ServiceLayout;

pub const CONTAINER_WORK_DIR: &str = "/work";
pub const CONTAINER_STATE_DIR: &str = "/state";

/// Used when the manifest has no interactive command
pub const DEFAULT_INTERACTIVE_COMMAND: &str = "/bin/bash";

/// Launches deployments with the docker CLI
#[derive(Debug, Clone)]
pub struct Orchestrator {
    docker_binary: String,

    /// Mounted into the container as the shim
    shim_executable: PathBuf,

    /// Allocate a pseudo-TTY for the container
    tty: bool,
}

impl Orchestrator {
    /// Orchestrator using `docker` from `PATH` and the running executable as the shim
    pub fn from_env() -> Result<Self, DeployerError> {
        Ok(Self {
            docker_binary: "docker".to_string(),
            shim_executable: std::env::current_exe()?,
            tty: std::io::stdin().is_terminal(),
        })
    }

    pub fn new(docker_binary: impl Into<String>, shim_executable: impl Into<PathBuf>, tty: bool) -> Self {
        Self {
            docker_binary: docker_binary.into(),
            shim_executable: shim_executable.into(),
            tty,
        }
    }

    /// Run the deploy command and wait for it to exit
    pub async fn deploy(
        &self,
        deployment: &Deployment,
        service: &ServiceLayout,
        cancel: CancellationToken,
    ) -> Result<(), DeployerError> {
        let args = prepare_docker_run(
            deployment,
            service,
            &self.shim_executable,
            &deployment.expanded_deploy_command,
            self.tty,
        )?;

        self.run(args, cancel).await
    }

    /// Run the interactive command (a shell by default) instead of deploying
    pub async fn interactive(
        &self,
        deployment: &Deployment,
        service: &ServiceLayout,
        cancel: CancellationToken,
    ) -> Result<(), DeployerError> {
        let command = interactive_command(deployment);

        let args = prepare_docker_run(deployment, service, &self.shim_executable, &command, self.tty)?;

        println!(
            "Entering interactive mode ({})\nDeploy command would have been: {}",
            command.join(" "),
            deployment.expanded_deploy_command.join(" ")
        );

        self.run(args, cancel).await
    }

    async fn run(&self, args: Vec<String>, cancel: CancellationToken) -> Result<(), DeployerError> {
        debug!("{} {}", self.docker_binary, args.join(" "));

        let mut child = Command::new(&self.docker_binary)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DeployerError::ContainerError(format!("failed to run {}: {}", self.docker_binary, e))
            })?;

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                warn!("cancelled, stopping {}", self.docker_binary);
                let _ = child.kill().await;
                return Err(DeployerError::Cancelled("deployment interrupted".to_string()));
            }
        };

        if !status.success() {
            // killed by a signal has no code
            return Err(DeployerError::CommandExited(status.code().unwrap_or(1)));
        }

        info!("deployment command finished");
        Ok(())
    }
}

fn interactive_command(deployment: &Deployment) -> Vec<String> {
    if deployment.expanded_deploy_interactive_command.is_empty() {
        vec![DEFAULT_INTERACTIVE_COMMAND.to_string()]
    } else {
        deployment.expanded_deploy_interactive_command.clone()
    }
}

/// Arguments to `docker` for running `command` in the deployment's image
pub fn prepare_docker_run(
    deployment: &Deployment,
    service: &ServiceLayout,
    shim_executable: &Path,
    command: &[String],
    tty: bool,
) -> Result<Vec<String>, DeployerError> {
    if command.is_empty() {
        return Err(DeployerError::ContainerError("no command to run".to_string()));
    }

    let mut args: Vec<String> = vec!["run".into(), "--rm".into()];
    args.push(if tty { "-it" } else { "-i" }.into());

    args.push("-v".into());
    args.push(mount(service.work_dir().path(), SHIM_WORK_COPY_DIR));
    args.push("-v".into());
    args.push(mount(service.state_dir().path(), CONTAINER_STATE_DIR));

    // an entrypoint in the image would receive our command as arguments
    args.extend(["--entrypoint".into(), String::new()]);
    args.extend(["--workdir".into(), CONTAINER_WORK_DIR.into()]);

    args.push("-e".into());
    args.push(format!("FRIENDLY_REV_ID={}", deployment.vam.version.friendly_version));
    for (key, value) in &deployment.user_config.envs {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }

    args.push("-v".into());
    args.push(mount(shim_executable, SHIM_BINARY_MOUNT_POINT));

    args.push(deployment.vam.manifest.deployer_image.clone());

    // "--" keeps the real command's flags away from the shim's own parser
    args.extend([SHIM_BINARY_MOUNT_POINT.into(), SHIM_COMMAND.into(), "--".into()]);

    if command[0].starts_with('/') {
        args.extend(command.iter().cloned());
    } else {
        let escaped: Vec<String> = command.iter().map(|arg| shell_escape(arg)).collect();
        args.extend(["/bin/sh".into(), "-c".into(), escaped.join(" ")]);
    }

    Ok(args)
}

fn mount(host: &Path, container: &str) -> String {
    format!("{}:{}", host.display(), container)
}

/// Quote `s` for POSIX sh. Strings made only of safe characters are left as-is.
pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    let safe = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        return s.to_string();
    }

    format!("'{}'", s.replace('\'', "'\"'\"'"))
}
