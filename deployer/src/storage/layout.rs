//! On-disk layout
//!
//! ```text
//! deployments/
//! |-- .eventlog/               (default event log location)
//! |-- hq
//! |   |-- state/               persistent, bind-mounted at /state
//! |   |-- work/                ephemeral, extracted spec package
//! |   `-- user-config.json
//! `-- anotherservice
//!     `-- ...
//! ```

use std::path::PathBuf;

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Root of everything deployer keeps on disk
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Layout rooted at the current working directory, made absolute because
    /// paths are handed to docker as bind-mount sources.
    pub fn from_current_dir() -> Result<Self, DeployerError> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("deployer-settings.json"))
    }

    pub fn deployments_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("deployments"))
    }

    pub fn default_event_log_dir(&self) -> Dir {
        self.deployments_dir().subdir(".eventlog")
    }

    /// Directories of one service. The id must name a single directory
    /// directly under `deployments/`.
    pub fn service(&self, service_id: &str) -> Result<ServiceLayout, DeployerError> {
        if service_id.is_empty()
            || service_id.contains("..")
            || service_id.contains('/')
            || service_id.contains('\\')
        {
            return Err(DeployerError::InvalidServiceId(service_id.to_string()));
        }

        Ok(ServiceLayout {
            service_id: service_id.to_string(),
            dir: self.deployments_dir().subdir(service_id),
        })
    }
}

/// Per-service directories
#[derive(Debug, Clone)]
pub struct ServiceLayout {
    pub service_id: String,
    dir: Dir,
}

impl ServiceLayout {
    pub fn dir(&self) -> &Dir {
        &self.dir
    }

    /// Extracted spec package and downloaded artefacts. Wiped between deploys
    /// unless the cache is explicitly kept.
    pub fn work_dir(&self) -> Dir {
        self.dir.subdir("work")
    }

    /// The only place a deployment may keep state across deploys
    pub fn state_dir(&self) -> Dir {
        self.dir.subdir("state")
    }

    pub fn user_config_file(&self) -> File {
        self.dir.file("user-config.json")
    }
}
