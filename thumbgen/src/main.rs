//! `thumbgen` daemon entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use thumbgen_config::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, ConfigWarnings};
use thumbgen_core::PreviewWatcher;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "thumbgen", version)]
#[command(about = "Generates and maintains JPEG previews for an upload directory")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to a thumbgen.toml configuration file
    #[arg(long, global = true, env = "THUMBGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Load environment overrides from this file instead of `./.env`
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Upload directory to watch (overrides config)
    #[arg(long, global = true, env = "UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Regenerate all previews at startup before watching
    #[arg(long, default_value_t = false)]
    regenerate: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the startup sequence and watch for changes (default)
    Watch,
    /// Regenerate every preview once, then exit
    Regenerate,
    /// Delete previews whose original is gone, then exit
    Gc,
    /// Load and validate configuration, print the effective values
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ConfigLoad { config, warnings } = load_config(&cli)?;
    log_warnings(&warnings);
    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "loaded configuration file");
    }

    let watcher = PreviewWatcher::with_config(config.pipeline());

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => {
            info!(
                root = %watcher.layout().root().display(),
                sizes = watcher.layout().sizes().len(),
                "starting preview watcher"
            );
            watcher
                .run_until(cli.regenerate, shutdown_signal())
                .await
                .context("preview watcher failed")?;
        }
        Command::Regenerate => {
            watcher
                .start(true)
                .await
                .context("regeneration failed")?;
        }
        Command::Gc => {
            let report = watcher
                .collect_garbage()
                .await
                .context("garbage collection failed")?;
            println!(
                "scanned {} previews for {} originals, deleted {}, failed {}",
                report.scanned,
                report.valid_originals,
                report.deleted.len(),
                report.failed
            );
            for path in report.deleted.iter().chain(&report.temps_removed) {
                println!("  removed {}", path.display());
            }
        }
        Command::CheckConfig => {
            let rendered = config
                .to_toml()
                .context("failed to render effective configuration")?;
            print!("{rendered}");
            for warning in &warnings.items {
                match &warning.hint {
                    Some(hint) => println!("# warning: {} ({hint})", warning.message),
                    None => println!("# warning: {}", warning.message),
                }
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<ConfigLoad> {
    ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: cli.config.clone(),
        env_file: cli.env_file.clone(),
        upload_dir: cli.upload_dir.clone(),
    })
    .load()
    .context("failed to load configuration")
}

fn log_warnings(warnings: &ConfigWarnings) {
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
