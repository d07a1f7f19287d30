//! Stubs for new deployments and new projects

use std::collections::BTreeMap;

use crate::deploy::download::{Materializer, SpecSource};
use crate::deploy::spec::{DeploymentManifest, EnvVarSpec, UserConfig, VersionAndManifest};
use crate::errors::DeployerError;
use crate::storage::layout::{ServiceLayout, StorageLayout};

/// User config with every declared variable filled with its placeholder
pub fn user_config_stub(service_id: &str, vam: &VersionAndManifest) -> UserConfig {
    let envs: BTreeMap<String, String> = vam
        .manifest
        .env_vars
        .iter()
        .map(|env| {
            let value = if env.optional {
                format!("(optional) {}", env.placeholder)
            } else {
                env.placeholder.clone()
            };
            (env.key.clone(), value)
        })
        .collect();

    UserConfig {
        service_id: service_id.to_string(),
        envs,
        software_unique_id: vam.manifest.software_unique_id.clone(),
        repository: String::new(),
    }
}

/// Download a release's spec and write a `user-config.json` stub for the service
pub async fn deployment_init(
    layout: &StorageLayout,
    service: &ServiceLayout,
    materializer: &Materializer,
    source: &SpecSource,
) -> Result<UserConfig, DeployerError> {
    // creating directories in the wrong place would be easy to miss
    if !layout.deployments_dir().exists().await {
        return Err(DeployerError::ConfigError(format!(
            "{} directory does not exist - aborting for safety. If this is the right location and you're running deployer for the first time, run: mkdir deployments",
            layout.deployments_dir().path().display()
        )));
    }

    let config_file = service.user_config_file();
    if config_file.exists().await {
        return Err(DeployerError::ConfigError(format!(
            "{} already exists - refusing to overwrite",
            config_file.path().display()
        )));
    }

    let vam = materializer.download_spec(&service.work_dir(), source).await?;

    let stub = user_config_stub(&service.service_id, &vam);
    config_file.write_json(&stub).await?;

    println!("Wrote {}", config_file.path().display());
    Ok(stub)
}

/// Manifest for a new project, with a fresh software ID
pub fn manifest_stub() -> DeploymentManifest {
    DeploymentManifest {
        manifest_version_major: 1,
        deployer_image: "fn61/infrastructureascode:20190107_1257_ec16791b".to_string(),
        deploy_command: vec!["/work/deploy.sh".to_string()],
        deploy_interactive_command: vec![],
        download_artefacts: vec![],
        download_artefact_url_template: String::new(),
        env_vars: vec![
            EnvVarSpec {
                key: "MY_AWESOME_API_KEY".to_string(),
                optional: false,
                placeholder: "Looks like AKIAI..".to_string(),
                help: "Your API key for AWS".to_string(),
            },
            EnvVarSpec {
                key: "OPTIONAL_KEY".to_string(),
                optional: true,
                placeholder: String::new(),
                help: "Set to 'foo' to charge the flux capacitor".to_string(),
            },
        ],
        software_unique_id: uuid::Uuid::new_v4().to_string(),
    }
}
