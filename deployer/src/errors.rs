//! Error types for deployer

use thiserror::Error;

/// Main error type for deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    // Release catalog
    #[error("Release catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),

    #[error("Release not found by ID: {0}")]
    NotFound(String),

    // Artefact resolution
    #[error("unsupported URI: {0}")]
    UnsupportedUri(String),

    #[error("Invalid artefact location: {0}")]
    InvalidLocation(String),

    #[error("asset to download not found: {0}")]
    AssetNotFound(String),

    #[error("{filename} not found from manifest of {image_ref}")]
    LayerNotFound { filename: String, image_ref: String },

    #[error("Registry client error: {0}")]
    RegistryError(String),

    // Spec package
    #[error("file {0} in zip tries to exploit path traversal")]
    PathTraversal(String),

    #[error("unsupported manifest version; got {0}")]
    UnsupportedManifestVersion(i64),

    #[error("no variable defined in user config: {0}")]
    UndefinedVariable(String),

    #[error("unknown expansion key: {0}")]
    UnknownExpansionKey(String),

    // User config
    #[error("invalid service ID: {0}")]
    InvalidServiceId(String),

    #[error("Deployment config not found for service {0}")]
    UserConfigNotFound(String),

    #[error("ENV {0} required but not defined in user config")]
    MissingRequiredEnv(String),

    #[error("unknown ENV {0} defined in user config")]
    UnknownEnvKey(String),

    #[error("software_unique_id cannot be empty in manifest")]
    EmptySoftwareId,

    #[error("software ID mismatch; user config({user}) != deployment package({manifest})")]
    SoftwareIdMismatch { user: String, manifest: String },

    // Publishing
    #[error("already have revision {0}")]
    AlreadyPublished(String),

    #[error("upload {path} failed: {reason}")]
    UploadFailed { path: String, reason: String },

    // Execution
    #[error("Container error: {0}")]
    ContainerError(String),

    #[error("deploy command exited with code {0}")]
    CommandExited(i32),

    #[error("Shim error: {0}")]
    ShimError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployerError {
    /// Remediation hint for errors the operator can fix by editing configuration
    pub fn hint(&self) -> Option<String> {
        match self {
            DeployerError::UserConfigNotFound(service_id) => Some(format!(
                "run: deployer deployment-init {} <releaseId>",
                service_id
            )),
            DeployerError::MissingRequiredEnv(key) => Some(format!(
                "add \"{}\" to envs in the service's user-config.json",
                key
            )),
            DeployerError::UnknownEnvKey(key) => Some(format!(
                "remove \"{}\" from envs in the service's user-config.json",
                key
            )),
            DeployerError::SoftwareIdMismatch { .. } => Some(
                "the release is for different software than this service was initialized with; check the release ID"
                    .to_string(),
            ),
            DeployerError::ConfigError(_) => {
                Some("check deployer-settings.json and DEPLOYER_* / GITHUB_* environment variables".to_string())
            }
            _ => None,
        }
    }
}

impl DeployerError {
    /// Process exit code to report for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployerError::CommandExited(code) if *code != 0 => *code,
            _ => 1,
        }
    }
}

impl From<deployer_events::EventError> for DeployerError {
    fn from(err: deployer_events::EventError) -> Self {
        match err {
            deployer_events::EventError::UnsupportedType(t) => DeployerError::UnsupportedEventType(t),
            deployer_events::EventError::Malformed(e) => DeployerError::JsonError(e),
        }
    }
}
