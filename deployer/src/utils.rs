//! Utility functions

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Version information for the binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub friendly_version: String,
    pub git_hash: String,
    pub build_time: String,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        friendly_version: option_env!("FRIENDLY_VERSION").unwrap_or("dev").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Cooldown options for exponential backoff
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(15),
            multiplier: 2.0,
        }
    }
}

/// Delay before retry number `attempt` (0-based), capped at `max_delay`
pub fn calc_exp_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let exponent = attempt.min(63) as i32;
    let delay_secs = options.base_delay.as_secs_f64() * options.multiplier.powi(exponent);
    Duration::from_secs_f64(delay_secs.min(options.max_delay.as_secs_f64()))
}

/// Short random ID for a release, URL-safe and never starting with a dash
/// (so it cannot be mistaken for a CLI flag).
pub fn generate_release_id() -> String {
    loop {
        let random = uuid::Uuid::new_v4();
        let id = URL_SAFE_NO_PAD.encode(&random.as_bytes()[..4]);
        if !id.starts_with('-') {
            return id;
        }
    }
}

/// Hex-encoded SHA-256
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
