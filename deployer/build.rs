//! Build script for deployer
//!
//! Stamps the binary with the commit and a friendly build version in the same
//! "YYYYMMDD_HHMM_<shortrev>" shape that deployer spec packages use.

use chrono::Utc;
use std::process::Command;

fn main() {
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let now = Utc::now();

    let friendly_version = match std::env::var("FRIENDLY_REV_ID") {
        Ok(from_ci) if !from_ci.is_empty() => from_ci,
        _ => format!("{}_{}", now.format("%Y%m%d_%H%M"), git_hash),
    };

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=BUILD_TIME={}", now.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("cargo:rustc-env=FRIENDLY_VERSION={}", friendly_version);

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-env-changed=FRIENDLY_REV_ID");
}
