//! Application state shared by all commands

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::catalog::eventlog::{EventLog, FileEventLog};
use crate::catalog::store::ReleaseCatalog;
use crate::errors::DeployerError;
use crate::http::client::HttpClient;
use crate::http::github::GithubClient;
use crate::resolver::{OrasCli, ResolverDeps};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Everything a command needs, built once at startup
pub struct AppState {
    pub layout: StorageLayout,
    pub settings: Settings,
    pub catalog: Arc<ReleaseCatalog>,
    pub resolver_deps: ResolverDeps,
}

impl AppState {
    /// Wire up clients and the catalog. Nothing is read from the network yet.
    pub fn init(layout: StorageLayout, settings: Settings) -> Result<Self, DeployerError> {
        let event_log_dir = settings.event_log_dir(&layout);
        debug!("event log: {}", event_log_dir.display());

        let log: Arc<dyn EventLog> = Arc::new(FileEventLog::new(event_log_dir));
        Self::with_event_log(layout, settings, log)
    }

    pub fn with_event_log(
        layout: StorageLayout,
        settings: Settings,
        log: Arc<dyn EventLog>,
    ) -> Result<Self, DeployerError> {
        let timeout = settings.downloads.timeout();
        let upload_timeout = Duration::from_secs(settings.uploads.per_file_timeout_secs);

        let github = match &settings.github_token {
            Some(token) => Some(Arc::new(GithubClient::new(
                &settings.github,
                token.clone(),
                timeout,
                upload_timeout,
            )?)),
            None => None,
        };

        let resolver_deps = ResolverDeps {
            http: HttpClient::new(timeout)?,
            github,
            oras: OrasCli::default(),
        };

        Ok(Self {
            layout,
            settings,
            catalog: Arc::new(ReleaseCatalog::new(log)),
            resolver_deps,
        })
    }

    /// GitHub client for commands that cannot work without one
    pub fn require_github(&self) -> Result<Arc<GithubClient>, DeployerError> {
        self.settings.require_github_token()?;

        self.resolver_deps
            .github
            .clone()
            .ok_or_else(|| DeployerError::ConfigError("GITHUB_TOKEN not set".to_string()))
    }
}
