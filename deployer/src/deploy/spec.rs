//! Deployment spec types, user config validation and command expansion

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;

pub const MANIFEST_FILENAME: &str = "manifest.json";
pub const VERSION_FILENAME: &str = "version.json";

/// The only manifest major version this deployer understands
pub const SUPPORTED_MANIFEST_VERSION_MAJOR: i64 = 1;

/// One user-configurable environment variable
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvVarSpec {
    pub key: String,

    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub placeholder: String,

    #[serde(default)]
    pub help: String,
}

/// `version.json` of a spec package
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Version {
    /// e.g. "20190107_1257_ec16791b"
    pub friendly_version: String,
}

/// `manifest.json` of a spec package
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub manifest_version_major: i64,

    /// Image the deploy command runs in
    pub deployer_image: String,

    #[serde(default)]
    pub deploy_command: Vec<String>,

    /// Defaults to an interactive shell when empty
    #[serde(default)]
    pub deploy_interactive_command: Vec<String>,

    #[serde(default)]
    pub download_artefacts: Vec<String>,

    /// May contain `{version}` and `{filename}`
    #[serde(default, rename = "download_artefact_urltemplate")]
    pub download_artefact_url_template: String,

    #[serde(default)]
    pub env_vars: Vec<EnvVarSpec>,

    /// Stays the same across releases of the same software
    #[serde(default)]
    pub software_unique_id: String,
}

/// `deployments/<service>/user-config.json`, written by the operator
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserConfig {
    pub service_id: String,

    #[serde(default)]
    pub envs: BTreeMap<String, String>,

    pub software_unique_id: String,

    /// "owner/name", used to resolve the `latest` release
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionAndManifest {
    pub version: Version,
    pub manifest: DeploymentManifest,
}

/// A validated deployment, ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub vam: VersionAndManifest,
    pub user_config: UserConfig,
    pub expanded_deploy_command: Vec<String>,
    pub expanded_deploy_interactive_command: Vec<String>,
}

/// Read `manifest.json` and `version.json` from an extracted spec
pub async fn load_version_and_manifest(dir: &Dir) -> Result<VersionAndManifest, DeployerError> {
    let manifest: DeploymentManifest = dir.file(MANIFEST_FILENAME).read_json().await?;

    if manifest.manifest_version_major != SUPPORTED_MANIFEST_VERSION_MAJOR {
        return Err(DeployerError::UnsupportedManifestVersion(
            manifest.manifest_version_major,
        ));
    }

    let version: Version = dir.file(VERSION_FILENAME).read_json().await?;

    Ok(VersionAndManifest { version, manifest })
}

/// Check the user config against the manifest and expand the commands
pub fn validate_user_config(
    user: &UserConfig,
    vam: &VersionAndManifest,
) -> Result<Deployment, DeployerError> {
    for env in &vam.manifest.env_vars {
        if !env.optional && !user.envs.contains_key(&env.key) {
            return Err(DeployerError::MissingRequiredEnv(env.key.clone()));
        }
    }

    for key in user.envs.keys() {
        if !vam.manifest.env_vars.iter().any(|env| &env.key == key) {
            return Err(DeployerError::UnknownEnvKey(key.clone()));
        }
    }

    if vam.manifest.software_unique_id.is_empty() {
        return Err(DeployerError::EmptySoftwareId);
    }

    if user.software_unique_id != vam.manifest.software_unique_id {
        return Err(DeployerError::SoftwareIdMismatch {
            user: user.software_unique_id.clone(),
            manifest: vam.manifest.software_unique_id.clone(),
        });
    }

    let expand = |command: &[String]| {
        command
            .iter()
            .map(|part| expand_possible_variables(part, vam, user))
            .collect::<Result<Vec<_>, _>>()
    };

    Ok(Deployment {
        expanded_deploy_command: expand(&vam.manifest.deploy_command)?,
        expanded_deploy_interactive_command: expand(&vam.manifest.deploy_interactive_command)?,
        vam: vam.clone(),
        user_config: user.clone(),
    })
}

/// First `${key}` token in `input` with a non-empty key, as (token, key)
fn find_variable(input: &str) -> Option<(&str, &str)> {
    let mut offset = 0;

    while let Some(start) = input[offset..].find("${").map(|i| offset + i) {
        let key_start = start + 2;
        if let Some(len) = input[key_start..].find('}') {
            if len > 0 {
                let end = key_start + len + 1;
                return Some((&input[start..end], &input[key_start..end - 1]));
            }
        }
        offset = start + 1;
    }

    None
}

/// `"--version=${_.version.friendly}"` => `"--version=v314"`
///
/// Only the first `${...}` in `input` is evaluated. Every occurrence of that
/// exact token is replaced; any other token is left as-is.
pub fn expand_possible_variables(
    input: &str,
    vam: &VersionAndManifest,
    user: &UserConfig,
) -> Result<String, DeployerError> {
    let Some((token, key)) = find_variable(input) else {
        return Ok(input.to_string());
    };

    let value = if key == "_.version.friendly" {
        vam.version.friendly_version.clone()
    } else if let Some(env_key) = key.strip_prefix("_.env.") {
        user.envs
            .get(env_key)
            .cloned()
            .ok_or_else(|| DeployerError::UndefinedVariable(env_key.to_string()))?
    } else {
        return Err(DeployerError::UnknownExpansionKey(key.to_string()));
    };

    Ok(input.replace(token, &value))
}
