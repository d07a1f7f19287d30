//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Deployer deploys your projects
#[derive(Debug, Parser)]
#[command(name = "deployer", disable_version_flag = true)]
pub struct Cli {
    /// Print build information as JSON and exit
    #[arg(long)]
    pub version: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Directly deploys the service
    Deploy {
        service_id: String,

        /// Release ID, "latest" or <artefactsLocation>#<specFilename>
        release_id: String,

        /// Enter interactive mode (prompt) instead of deploying
        #[arg(short, long)]
        interactive: bool,

        /// Do not remove the work directory (could be dangerous across releases!)
        #[arg(long)]
        keep_cache: bool,
    },

    /// Creates a new deployment stub for you to use
    DeploymentInit { service_id: String, release_id: String },

    /// Prints a new manifest stub for you to use in a new project
    ManifestNew,

    /// Packages the spec in the current directory into a zip
    Package {
        friendly_version: String,
        output: PathBuf,
    },

    /// Subcommands for releases
    Releases {
        #[command(subcommand)]
        command: ReleasesCommands,
    },

    /// Container-side bootstrap (internal)
    #[command(hide = true)]
    LaunchViaShim {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ReleasesCommands {
    /// List all releases
    Ls {
        /// Only show the newest releases
        #[arg(long)]
        truncate: bool,
    },

    /// Create GitHub release
    #[command(name = "githubrelease-mk")]
    GithubreleaseMk {
        owner: String,
        repo: String,
        release_name: String,
        revision_id: String,
        assets_dir: PathBuf,
    },

    /// Record a release whose artefacts are layers of an OCI image
    #[command(name = "ociimage-mk")]
    OciimageMk {
        image_ref: String,
        owner: String,
        repo: String,
        release_name: String,
        revision_id: String,
    },

    /// Download release
    Dl { service_id: String, release_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_flags() {
        let cli = Cli::parse_from(["deployer", "deploy", "hq", "aB3_x9", "-i", "--keep-cache"]);
        match cli.command {
            Some(Commands::Deploy {
                service_id,
                release_id,
                interactive,
                keep_cache,
            }) => {
                assert_eq!(service_id, "hq");
                assert_eq!(release_id, "aB3_x9");
                assert!(interactive);
                assert!(keep_cache);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_shim_passes_flags_through() {
        let cli = Cli::parse_from([
            "deployer",
            "launch-via-shim",
            "--",
            "/bin/sh",
            "-c",
            "deploy.sh --now",
        ]);
        match cli.command {
            Some(Commands::LaunchViaShim { argv }) => {
                assert_eq!(argv, vec!["/bin/sh", "-c", "deploy.sh --now"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_release_subcommand_names() {
        let cli = Cli::parse_from([
            "deployer",
            "releases",
            "githubrelease-mk",
            "function61",
            "coolproduct",
            "v1",
            "9c39d027",
            "rel/",
        ]);
        assert!(matches!(
            cli.command,
            Some(Commands::Releases {
                command: ReleasesCommands::GithubreleaseMk { .. }
            })
        ));

        let cli = Cli::parse_from(["deployer", "releases", "ls", "--truncate"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Releases {
                command: ReleasesCommands::Ls { truncate: true }
            })
        ));
    }

    #[test]
    fn test_version_flag() {
        let cli = Cli::parse_from(["deployer", "--version"]);
        assert!(cli.version);
        assert!(cli.command.is_none());
    }
}
