//! Release catalog tests

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use deployer_events::{Event, EventMeta, ReleaseCreated, SOFTWARE_RELEASES_STREAM};

use deployer::catalog::eventlog::{EventLog, FileEventLog, MemoryEventLog};
use deployer::catalog::store::ReleaseCatalog;
use deployer::errors::DeployerError;

fn release_created(id: &str, repository: &str, revision_id: &str, minute: u32) -> Event {
    Event::ReleaseCreated(
        ReleaseCreated {
            id: id.to_string(),
            repository: repository.to_string(),
            revision_friendly: format!("20200219_16{:02}_{}", minute, revision_id),
            revision_id: revision_id.to_string(),
            artefacts_location: format!("githubrelease:function61:coolproduct:{}", minute),
            deployer_spec_filename: "deployerspec.zip".to_string(),
        },
        EventMeta::system_user(Utc.with_ymd_and_hms(2020, 2, 19, 16, minute, 0).unwrap()),
    )
}

#[tokio::test]
async fn test_replay_from_file_log() {
    let tmp = tempfile::tempdir().unwrap();

    {
        let catalog = ReleaseCatalog::new(Arc::new(FileEventLog::new(tmp.path())));
        catalog
            .append(&[
                release_created("r1", "function61/coolproduct", "9c39d027", 1),
                release_created("r2", "function61/coolproduct", "ab12cd34", 2),
            ])
            .await
            .unwrap();
    }

    // a fresh process sees the same history
    let catalog = ReleaseCatalog::new(Arc::new(FileEventLog::new(tmp.path())));
    assert!(!catalog.has_revision_id("9c39d027").await);

    catalog.load_until_realtime().await.unwrap();
    assert!(catalog.has_revision_id("9c39d027").await);
    assert!(catalog.has_revision_id("ab12cd34").await);
    assert!(!catalog.has_revision_id("ffffffff").await);

    let release = catalog.by_id("r2").await.unwrap();
    assert_eq!(release.revision_friendly, "20200219_1602_ab12cd34");
    assert_eq!(release.created, Utc.with_ymd_and_hms(2020, 2, 19, 16, 2, 0).unwrap());

    assert!(tmp.path().join("software-releases.jsonl").exists());
}

#[tokio::test]
async fn test_listing_and_latest() {
    let catalog = ReleaseCatalog::new(Arc::new(MemoryEventLog::new()));
    catalog
        .append(&[
            release_created("r1", "function61/coolproduct", "rev1", 1),
            release_created("r2", "function61/other", "rev2", 2),
            release_created("r3", "function61/coolproduct", "rev3", 3),
        ])
        .await
        .unwrap();

    let ids: Vec<String> = catalog
        .all_newest_first()
        .await
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["r3", "r2", "r1"]);

    let latest = catalog
        .latest_for_repository("function61/coolproduct")
        .await
        .unwrap();
    assert_eq!(latest.id, "r3");
    assert!(catalog.latest_for_repository("function61/nope").await.is_none());

    assert!(matches!(
        catalog.by_id("nope").await,
        Err(DeployerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_catches_up_with_other_writers() {
    let log = Arc::new(MemoryEventLog::new());
    let reader = ReleaseCatalog::new(log.clone());
    let writer = ReleaseCatalog::new(log.clone());

    reader.load_until_realtime().await.unwrap();
    assert!(reader.all().await.is_empty());

    writer
        .append(&[release_created("r1", "function61/coolproduct", "rev1", 1)])
        .await
        .unwrap();

    reader.load_until_realtime().await.unwrap();
    assert_eq!(reader.all().await.len(), 1);

    // replaying again does not duplicate
    reader.load_until_realtime().await.unwrap();
    assert_eq!(reader.all().await.len(), 1);
}

#[tokio::test]
async fn test_unknown_event_type_fails_load() {
    let log = Arc::new(MemoryEventLog::new());
    log.append(
        SOFTWARE_RELEASES_STREAM,
        vec![r#"{"type":"ReleaseDeleted","meta":{"timestamp":"2020-02-19T16:09:00Z","user":"system"},"data":{}}"#.to_string()],
    )
    .await
    .unwrap();

    let catalog = ReleaseCatalog::new(log);
    assert!(matches!(
        catalog.load_until_realtime().await,
        Err(DeployerError::UnsupportedEventType(t)) if t == "ReleaseDeleted"
    ));
}
