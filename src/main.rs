use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use homelab_ops::commands;
use homelab_ops::config::{get_config_dir, AppSettings};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Remote ZFS pool management and file transfer for the homelab dashboard
#[derive(Parser)]
#[command(name = "homelab-ops")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the settings file (defaults to the user config directory)
    #[arg(short, long, global = true, env = "HOMELAB_OPS_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// ZFS pools on the configured host
    Pools {
        #[command(subcommand)]
        action: PoolAction,
    },
    /// Copy a local file or directory to the configured host
    Upload {
        source: PathBuf,
        destination: String,
        /// Refuse directory sources instead of copying them recursively
        #[arg(long)]
        no_recursive: bool,
    },
    /// Local disk usage
    Storage {
        #[command(subcommand)]
        action: StorageAction,
    },
    /// Inspect settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PoolAction {
    List,
    /// Force-destroy a pool. Irreversible.
    Destroy { name: String },
    /// Check SSH login and ZFS availability
    Probe,
}

#[derive(Subcommand)]
enum StorageAction {
    /// Usage of every configured storage path
    Info,
    /// Permissions, size and largest subdirectories of one path
    Details { path: PathBuf },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Path,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    homelab_ops::logging::init_tracing();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => get_config_dir()?.join("config.toml"),
    };
    let settings = load_settings(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling in-flight operation");
                cancel.cancel();
                // A second Ctrl-C does not wait for the session to unwind.
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted again, exiting");
                    std::process::exit(130);
                }
            }
        });
    }

    match cli.command {
        Command::Pools { action } => {
            let result = match action {
                PoolAction::List => commands::list_pools(&settings, cancel).await,
                PoolAction::Destroy { name } => {
                    commands::destroy_pool(&settings, name, cancel).await
                }
                PoolAction::Probe => commands::probe_zfs(&settings, cancel).await,
            };
            report(result.map(|r| (r.success, r)))
        }
        Command::Upload {
            source,
            destination,
            no_recursive,
        } => {
            let result =
                commands::upload(&settings, source, destination, !no_recursive, cancel).await;
            report(result.map(|r| (r.success, r)))
        }
        Command::Storage { action } => match action {
            StorageAction::Info => report(commands::storage_info(&settings).await.map(|r| (true, r))),
            StorageAction::Details { path } => {
                let result = commands::storage_details(path).await;
                report(result.map(|r| (r.exists, r)))
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", toml::to_string_pretty(&settings.redacted())?);
                Ok(ExitCode::SUCCESS)
            }
            ConfigAction::Path => {
                println!("{}", config_path.display());
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

fn load_settings(path: &Path) -> homelab_ops::AppResult<AppSettings> {
    if path.exists() {
        return AppSettings::load_file(path);
    }
    match path.parent() {
        Some(dir) if path.file_name().is_some_and(|n| n == "config.toml") => AppSettings::load(dir),
        _ => Ok(AppSettings::default()),
    }
}

/// Print the result (or error) as JSON; non-zero exit on failure.
fn report<T: Serialize>(result: homelab_ops::AppResult<(bool, T)>) -> Result<ExitCode> {
    match result {
        Ok((success, body)) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e)?);
            Ok(ExitCode::from(2))
        }
    }
}
