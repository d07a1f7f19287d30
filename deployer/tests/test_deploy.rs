//! Deploy command wiring tests: release resolution, user config and work dir handling

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use deployer_events::{Event, EventMeta, ReleaseCreated};
use tokio_util::sync::CancellationToken;

use deployer::app::options::DeployOptions;
use deployer::app::run::{self, ReleaseRef};
use deployer::app::state::AppState;
use deployer::catalog::eventlog::MemoryEventLog;
use deployer::deploy::docker::Orchestrator;
use deployer::deploy::spec::UserConfig;
use deployer::errors::DeployerError;
use deployer::storage::layout::StorageLayout;
use deployer::storage::settings::Settings;

const REPOSITORY: &str = "function61/coolproduct";

fn write_spec_zip(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();

    let manifest = serde_json::json!({
        "manifest_version_major": 1,
        "deployer_image": "fn61/infrastructureascode:20190107_1257_ec16791b",
        "deploy_command": ["deploy_website.sh", "--id", "${_.env.appId}"],
        "download_artefacts": [],
        "download_artefact_urltemplate": "",
        "env_vars": [{ "key": "appId" }],
        "software_unique_id": "5e4a0e8d"
    })
    .to_string();

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in [
        ("version.json", r#"{"friendly_version": "v314"}"#),
        ("manifest.json", manifest.as_str()),
    ] {
        writer.start_file(name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }

    std::fs::write(dir.join("deployerspec.zip"), writer.finish().unwrap().into_inner()).unwrap();
}

fn release_created(id: &str, location: String, minute: u32) -> Event {
    Event::ReleaseCreated(
        ReleaseCreated {
            id: id.to_string(),
            repository: REPOSITORY.to_string(),
            revision_friendly: format!("20200219_16{:02}_{}", minute, id),
            revision_id: id.to_string(),
            artefacts_location: location,
            deployer_spec_filename: "deployerspec.zip".to_string(),
        },
        EventMeta::system_user(Utc.with_ymd_and_hms(2020, 2, 19, 16, minute, 0).unwrap()),
    )
}

fn user_config(repository: &str) -> UserConfig {
    UserConfig {
        service_id: "hq".to_string(),
        envs: [("appId".to_string(), "hq-prod".to_string())].into_iter().collect(),
        software_unique_id: "5e4a0e8d".to_string(),
        repository: repository.to_string(),
    }
}

/// State rooted at `base` with two catalog releases of the same repository,
/// both pointing at spec packages on the local filesystem.
async fn state_with_releases(base: &Path) -> AppState {
    let old = base.join("releases/old");
    let new = base.join("releases/new");
    write_spec_zip(&old);
    write_spec_zip(&new);

    let state = AppState::with_event_log(
        StorageLayout::new(base),
        Settings::default(),
        Arc::new(MemoryEventLog::new()),
    )
    .unwrap();

    state
        .catalog
        .append(&[
            release_created("r1", format!("file:{}/", old.display()), 1),
            release_created("r2", format!("file:{}/", new.display()), 9),
        ])
        .await
        .unwrap();

    state
}

fn write_user_config(base: &Path, config: &UserConfig) {
    let dir = base.join("deployments/hq");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("user-config.json"), serde_json::to_string(config).unwrap()).unwrap();
}

#[tokio::test]
async fn test_latest_resolves_to_newest_release_of_repository() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_with_releases(tmp.path()).await;

    let source = run::resolve_spec_source(&state, &ReleaseRef::Latest, Some(&user_config(REPOSITORY)))
        .await
        .unwrap();

    assert_eq!(source.artefacts_location, format!("file:{}/", tmp.path().join("releases/new").display()));
    assert_eq!(source.spec_filename, "deployerspec.zip");
}

#[tokio::test]
async fn test_latest_without_repository_is_a_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_with_releases(tmp.path()).await;

    assert!(matches!(
        run::resolve_spec_source(&state, &ReleaseRef::Latest, Some(&user_config(""))).await,
        Err(DeployerError::ConfigError(_))
    ));
    assert!(matches!(
        run::resolve_spec_source(&state, &ReleaseRef::Latest, None).await,
        Err(DeployerError::ConfigError(_))
    ));
}

#[tokio::test]
async fn test_deploy_without_user_config_hints_at_init() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_with_releases(tmp.path()).await;
    let orchestrator = Orchestrator::new("/nonexistent/docker", "/nonexistent/deployer", false);

    let err = run::deploy_internal(
        &state,
        &orchestrator,
        "hq",
        "r2",
        &DeployOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DeployerError::UserConfigNotFound(ref svc) if svc == "hq"));
    assert!(err.hint().unwrap().contains("deployment-init hq"));
}

#[tokio::test]
async fn test_deploy_rejects_service_id_outside_deployments() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_with_releases(tmp.path()).await;
    let orchestrator = Orchestrator::new("/nonexistent/docker", "/nonexistent/deployer", false);

    let result = run::deploy_internal(
        &state,
        &orchestrator,
        "../hq",
        "r2",
        &DeployOptions::default(),
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(DeployerError::InvalidServiceId(_))));
}

#[cfg(unix)]
mod with_fake_docker {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Records its arguments, one per line, into `docker-args.txt` next to itself
    fn fake_docker(dir: &Path) -> Orchestrator {
        let script = dir.join("docker");
        let args_file = dir.join("docker-args.txt");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\nexit 0\n", args_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        Orchestrator::new(script.to_string_lossy(), "/usr/local/bin/deployer", false)
    }

    async fn deploy(base: &Path, keep_cache: bool) {
        let state = state_with_releases(base).await;
        let orchestrator = fake_docker(base);
        write_user_config(base, &user_config(REPOSITORY));

        let work = base.join("deployments/hq/work");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("stale.txt"), "left over").unwrap();

        run::deploy_internal(
            &state,
            &orchestrator,
            "hq",
            "latest",
            &DeployOptions {
                interactive: false,
                keep_cache,
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_deploy_wipes_work_dir() {
        let tmp = tempfile::tempdir().unwrap();
        deploy(tmp.path(), false).await;

        let work = tmp.path().join("deployments/hq/work");
        assert!(!work.join("stale.txt").exists());
        assert!(work.join("manifest.json").exists());
        assert!(tmp.path().join("deployments/hq/state").is_dir());

        let args = std::fs::read_to_string(tmp.path().join("docker-args.txt")).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(args[0], "run");
        assert!(args.contains(&"fn61/infrastructureascode:20190107_1257_ec16791b"));
        assert!(args.contains(&"appId=hq-prod"));
    }

    #[tokio::test]
    async fn test_keep_cache_preserves_work_dir() {
        let tmp = tempfile::tempdir().unwrap();
        deploy(tmp.path(), true).await;

        let work = tmp.path().join("deployments/hq/work");
        assert_eq!(std::fs::read_to_string(work.join("stale.txt")).unwrap(), "left over");
        assert!(work.join("manifest.json").exists());
    }
}
