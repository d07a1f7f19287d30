//! Deployer - Entry Point
//!
//! Deploys versioned services from packaged deployment specs into containers
//! and publishes new releases to the release catalog.

use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use deployer::app::cli::{Cli, Commands, ReleasesCommands};
use deployer::app::options::{DeployOptions, ListOptions};
use deployer::app::run;
use deployer::app::state::AppState;
use deployer::deploy::docker::Orchestrator;
use deployer::deploy::shim::launch_via_shim;
use deployer::errors::DeployerError;
use deployer::logs::{init_logging, LogOptions};
use deployer::storage::layout::StorageLayout;
use deployer::storage::settings::Settings;
use deployer::utils::version_info;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.version {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{}", json),
            Err(e) => exit_with(e.into()),
        }
        return;
    }

    let Some(command) = cli.command else {
        exit_with(DeployerError::ConfigError(
            "no command given; see deployer --help".to_string(),
        ));
    };

    let result = match command {
        // runs inside the container: no settings, catalog or logging setup
        Commands::LaunchViaShim { argv } => launch_via_shim(&argv).await,
        command => run_command(command).await,
    };

    if let Err(e) = result {
        exit_with(e);
    }
}

async fn run_command(command: Commands) -> Result<(), DeployerError> {
    let layout = StorageLayout::from_current_dir()?;
    let settings = Settings::load(&layout).await?;

    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.log_json,
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }
    debug!("working in {}", layout.base_dir.display());

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));

    // these need neither the catalog nor any clients
    match &command {
        Commands::ManifestNew => return run::print_manifest_stub(),
        Commands::Package {
            friendly_version,
            output,
        } => return run::package(friendly_version, output).await,
        _ => {}
    }

    let state = AppState::init(layout, settings)?;

    match command {
        Commands::Deploy {
            service_id,
            release_id,
            interactive,
            keep_cache,
        } => {
            let options = DeployOptions {
                interactive,
                keep_cache,
            };
            let orchestrator = Orchestrator::from_env()?;
            run::deploy_internal(&state, &orchestrator, &service_id, &release_id, &options, cancel)
                .await
        }
        Commands::DeploymentInit {
            service_id,
            release_id,
        } => run::init_deployment(&state, &service_id, &release_id)
            .await
            .map(|_| ()),
        Commands::Releases { command } => match command {
            ReleasesCommands::Ls { truncate } => {
                run::list_releases(&state, &ListOptions { truncate }).await
            }
            ReleasesCommands::GithubreleaseMk {
                owner,
                repo,
                release_name,
                revision_id,
                assets_dir,
            } => {
                let request = run::release_request(&owner, &repo, &release_name, &revision_id);
                run::create_github_release(&state, &request, &assets_dir, cancel)
                    .await
                    .map(|_| ())
            }
            ReleasesCommands::OciimageMk {
                image_ref,
                owner,
                repo,
                release_name,
                revision_id,
            } => {
                let request = run::release_request(&owner, &repo, &release_name, &revision_id);
                run::create_oci_release(&state, &image_ref, &request).await
            }
            ReleasesCommands::Dl {
                service_id,
                release_id,
            } => {
                let vam = run::download_release(&state, &service_id, &release_id).await?;
                info!(
                    "downloaded {} ({})",
                    vam.version.friendly_version,
                    state.layout.service(&service_id)?.work_dir().path().display()
                );
                Ok(())
            }
        },
        Commands::ManifestNew | Commands::Package { .. } | Commands::LaunchViaShim { .. } => {
            Err(DeployerError::Internal("command already handled".to_string()))
        }
    }
}

fn exit_with(e: DeployerError) -> ! {
    eprintln!("{}", format!("Error: {e}").red());
    if let Some(hint) = e.hint() {
        eprintln!("{}", format!("Hint: {hint}").yellow());
    }
    std::process::exit(e.exit_code());
}

async fn cancel_on_shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                warn!("unable to install signal handlers");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, stopping...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, stopping...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("unable to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received, stopping...");
    }

    cancel.cancel();
}
