//! Release catalog
//!
//! The in-memory view of every release ever published, rebuilt by replaying
//! the `software-releases` stream from the start.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use deployer_events::{Event, EventMeta, ReleaseCreated, SOFTWARE_RELEASES_STREAM};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::catalog::eventlog::{Cursor, EventLog};
use crate::errors::DeployerError;

/// Spec package name for releases that do not record one
pub const DEFAULT_SPEC_FILENAME: &str = "deployerspec.zip";

/// A published release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Release {
    pub id: String,
    pub repository: String,
    pub revision_friendly: String,
    pub revision_id: String,
    pub artefacts_location: String,
    pub deployer_spec_filename: String,
    pub created: DateTime<Utc>,
}

impl Release {
    pub fn spec_filename(&self) -> &str {
        if self.deployer_spec_filename.is_empty() {
            DEFAULT_SPEC_FILENAME
        } else {
            &self.deployer_spec_filename
        }
    }

    fn from_event(e: &ReleaseCreated, meta: &EventMeta) -> Self {
        Self {
            id: e.id.clone(),
            repository: e.repository.clone(),
            revision_friendly: e.revision_friendly.clone(),
            revision_id: e.revision_id.clone(),
            artefacts_location: e.artefacts_location.clone(),
            deployer_spec_filename: e.deployer_spec_filename.clone(),
            created: meta.timestamp,
        }
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    cursor: Cursor,
    releases: Vec<Release>,
}

impl CatalogState {
    fn apply(&mut self, event: &Event) {
        match event {
            Event::ReleaseCreated(e, meta) => self.releases.push(Release::from_event(e, meta)),
        }
    }
}

/// Queryable release history
pub struct ReleaseCatalog {
    log: Arc<dyn EventLog>,
    state: Mutex<CatalogState>,
}

impl ReleaseCatalog {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self {
            log,
            state: Mutex::new(CatalogState::default()),
        }
    }

    /// Replay the log up to its current head
    pub async fn load_until_realtime(&self) -> Result<(), DeployerError> {
        let mut state = self.state.lock().await;

        loop {
            let batch = self
                .log
                .read(SOFTWARE_RELEASES_STREAM, state.cursor)
                .await
                .map_err(|e| match e {
                    DeployerError::CatalogUnavailable(_) => e,
                    other => DeployerError::CatalogUnavailable(other.to_string()),
                })?;

            for line in &batch.lines {
                let event = deployer_events::parse(line)?;
                state.apply(&event);
                state.cursor += 1;
            }

            if !batch.more {
                break;
            }
        }

        debug!(
            "release catalog at cursor {} with {} releases",
            state.cursor,
            state.releases.len()
        );
        Ok(())
    }

    pub async fn by_id(&self, id: &str) -> Result<Release, DeployerError> {
        self.state
            .lock()
            .await
            .releases
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| DeployerError::NotFound(id.to_string()))
    }

    pub async fn has_revision_id(&self, revision_id: &str) -> bool {
        self.state
            .lock()
            .await
            .releases
            .iter()
            .any(|r| r.revision_id == revision_id)
    }

    /// Releases in append order
    pub async fn all(&self) -> Vec<Release> {
        self.state.lock().await.releases.clone()
    }

    pub async fn all_newest_first(&self) -> Vec<Release> {
        let mut releases = self.all().await;
        releases.reverse();
        releases
    }

    /// Newest release of a repository ("owner/name")
    pub async fn latest_for_repository(&self, repository: &str) -> Option<Release> {
        self.state
            .lock()
            .await
            .releases
            .iter()
            .rev()
            .find(|r| r.repository == repository)
            .cloned()
    }

    /// Append events to the log, then catch up so they become visible
    pub async fn append(&self, events: &[Event]) -> Result<(), DeployerError> {
        let lines = events
            .iter()
            .map(deployer_events::serialize)
            .collect::<Result<Vec<_>, _>>()?;

        self.log.append(SOFTWARE_RELEASES_STREAM, lines).await?;
        self.load_until_realtime().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::eventlog::MemoryEventLog;

    fn created(id: &str, revision_id: &str, spec: &str) -> Event {
        Event::ReleaseCreated(
            ReleaseCreated {
                id: id.to_string(),
                repository: "function61/coolproduct".to_string(),
                revision_friendly: format!("friendly-{}", id),
                revision_id: revision_id.to_string(),
                artefacts_location: "file:/tmp/".to_string(),
                deployer_spec_filename: spec.to_string(),
            },
            EventMeta::system_user(Utc::now()),
        )
    }

    #[tokio::test]
    async fn test_spec_filename_default() {
        let catalog = ReleaseCatalog::new(Arc::new(MemoryEventLog::new()));
        catalog
            .append(&[created("a", "rev-a", ""), created("b", "rev-b", "custom.zip")])
            .await
            .unwrap();

        assert_eq!(catalog.by_id("a").await.unwrap().spec_filename(), "deployerspec.zip");
        assert_eq!(catalog.by_id("b").await.unwrap().spec_filename(), "custom.zip");
    }

    #[tokio::test]
    async fn test_unknown_event_type_fails_replay() {
        let log = Arc::new(MemoryEventLog::new());
        log.append(
            SOFTWARE_RELEASES_STREAM,
            vec![r#"{"type":"ReleaseDeleted","meta":{"timestamp":"2020-02-20T14:02:00Z","user":"system"},"data":{}}"#.to_string()],
        )
        .await
        .unwrap();

        let catalog = ReleaseCatalog::new(log);
        assert!(matches!(
            catalog.load_until_realtime().await,
            Err(DeployerError::UnsupportedEventType(t)) if t == "ReleaseDeleted"
        ));
    }

    #[tokio::test]
    async fn test_latest_for_repository() {
        let catalog = ReleaseCatalog::new(Arc::new(MemoryEventLog::new()));
        assert!(catalog.latest_for_repository("function61/coolproduct").await.is_none());

        catalog
            .append(&[created("a", "rev-a", ""), created("b", "rev-b", "")])
            .await
            .unwrap();

        assert_eq!(
            catalog
                .latest_for_repository("function61/coolproduct")
                .await
                .unwrap()
                .id,
            "b"
        );
        assert!(catalog.latest_for_repository("other/repo").await.is_none());
    }
}
