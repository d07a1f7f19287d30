//! Settings file management
//!
//! Settings come from an optional `deployer-settings.json` next to the
//! `deployments/` directory, with environment variables taking precedence.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::DeployerError;
use crate::logs::LogLevel;
use crate::storage::layout::StorageLayout;

/// Deployer settings
#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Where the release event log lives. Defaults to `deployments/.eventlog`.
    #[serde(default)]
    pub event_log_dir: Option<PathBuf>,

    #[serde(default)]
    pub github: GithubSettings,

    #[serde(default)]
    pub downloads: DownloadSettings,

    #[serde(default)]
    pub uploads: UploadSettings,

    /// Only ever read from `GITHUB_TOKEN`
    #[serde(skip)]
    pub github_token: Option<SecretString>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            event_log_dir: None,
            github: GithubSettings::default(),
            downloads: DownloadSettings::default(),
            uploads: UploadSettings::default(),
            github_token: None,
        }
    }
}

impl Settings {
    /// Read the settings file (if any) and apply environment overrides
    pub async fn load(layout: &StorageLayout) -> Result<Self, DeployerError> {
        let file = layout.settings_file();
        let mut settings = match file.read_json_opt::<Settings>().await {
            Ok(Some(settings)) => {
                debug!("loaded settings from {}", file.path().display());
                settings
            }
            Ok(None) => Settings::default(),
            Err(e) => {
                return Err(DeployerError::ConfigError(format!(
                    "{}: {}",
                    file.path().display(),
                    e
                )))
            }
        };

        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply overrides from the environment. `lookup` is `std::env::var` outside tests.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), DeployerError> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(level) = lookup("DEPLOYER_LOG_LEVEL") {
            self.log_level = level.parse().map_err(DeployerError::ConfigError)?;
        }
        if let Some(dir) = lookup("DEPLOYER_EVENTLOG_DIR") {
            self.event_log_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup("GITHUB_API_URL") {
            self.github.api_url = url;
        }
        if let Some(url) = lookup("GITHUB_UPLOADS_URL") {
            self.github.uploads_url = url;
        }
        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.github_token = Some(SecretString::from(token));
        }

        Ok(())
    }

    /// The GitHub token, for operations that cannot proceed without one
    pub fn require_github_token(&self) -> Result<&SecretString, DeployerError> {
        self.github_token
            .as_ref()
            .ok_or_else(|| DeployerError::ConfigError("GITHUB_TOKEN not set".to_string()))
    }

    pub fn event_log_dir(&self, layout: &StorageLayout) -> PathBuf {
        match &self.event_log_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => layout.base_dir.join(dir),
            None => layout.default_event_log_dir().path().to_path_buf(),
        }
    }
}

/// GitHub endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubSettings {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    #[serde(default = "default_github_uploads_url")]
    pub uploads_url: String,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_uploads_url() -> String {
    "https://uploads.github.com".to_string()
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            uploads_url: default_github_uploads_url(),
        }
    }
}

/// Artefact download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Timeout for a single artefact request
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,
}

fn default_download_timeout() -> u64 {
    30
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_download_timeout(),
        }
    }
}

impl DownloadSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Release asset upload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    #[serde(default = "default_upload_concurrency")]
    pub concurrency: usize,

    /// Overall budget for one file, retries included
    #[serde(default = "default_per_file_timeout")]
    pub per_file_timeout_secs: u64,
}

fn default_upload_concurrency() -> usize {
    3
}

fn default_per_file_timeout() -> u64 {
    300
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            concurrency: default_upload_concurrency(),
            per_file_timeout_secs: default_per_file_timeout(),
        }
    }
}
