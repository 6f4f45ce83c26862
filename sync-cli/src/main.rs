//! # openneuro
//!
//! Command line client for synchronizing OpenNeuro datasets.
//!
//! ## Commands
//!
//! - `login`: Save an API token
//! - `upload`: Make a dataset draft match a local directory
//! - `download`: Make a local directory match a dataset snapshot
//! - `publish`: Publish a dataset
//!
//! ## Example
//!
//! ```bash
//! # Save a token
//! openneuro login
//!
//! # Upload, creating a new dataset
//! openneuro upload --force
//!
//! # Upload changes to an existing dataset, removing files deleted locally
//! openneuro upload --delete ds000001 ./my-study
//!
//! # Download a snapshot
//! openneuro download --version 1.0.0 ds000001 ./ds000001
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use sync_client::{EngineError, HttpRemote, Interrupt, SyncEngine};
use sync_types::{DatasetId, Version};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod progress;

use commands::download::DownloadArgs;
use commands::upload::UploadArgs;
use commands::{download, login, publish, upload, Completion};
use config::{default_config_dir, resolve_credentials, StoredCredentials};
use progress::IndicatifCallback;

/// Exit code after Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

/// Command line client for synchronizing OpenNeuro datasets.
#[derive(Parser, Debug)]
#[command(name = "openneuro")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding the saved credentials [default: ~/.openneuro]
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Server URL (overrides the saved one)
    #[arg(long, global = true, env = "OPENNEURO_SERVER")]
    server: Option<String>,

    /// API token (overrides the saved one)
    #[arg(long, global = true, env = "OPENNEURO_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// More log output (repeat for more)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Save an API token for later commands
    Login,

    /// Upload a directory to a dataset draft
    Upload {
        /// Delete remote files that are not present locally
        #[arg(long)]
        delete: bool,

        /// Create a new dataset without asking
        #[arg(long, short)]
        force: bool,

        /// Show what would be transferred, change nothing
        #[arg(long)]
        dry_run: bool,

        /// Dataset to upload to (a new one is created if omitted)
        dataset: Option<DatasetId>,

        /// Directory to upload
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Download a dataset into a directory
    Download {
        /// Delete local files that are not in the dataset
        #[arg(long)]
        delete: bool,

        /// Snapshot to download (the draft if omitted)
        #[arg(long = "version", value_name = "VERSION")]
        snapshot: Option<Version>,

        /// Show what would be transferred, change nothing
        #[arg(long)]
        dry_run: bool,

        /// Dataset to download
        dataset: DatasetId,

        /// Directory to download into
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Publish a dataset
    Publish {
        /// Dataset to publish
        dataset: DatasetId,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => Ok(code),
        Err(e) => {
            if let Some(partial) = engine_error(&e).and_then(EngineError::partial) {
                commands::print_report(partial);
            }
            if is_interrupt(&e) {
                eprintln!("Interrupted");
                return Ok(ExitCode::from(EXIT_INTERRUPTED));
            }
            Err(e)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let Cli {
        config_dir,
        server,
        token,
        command,
        ..
    } = cli;
    let config_dir = match config_dir {
        Some(dir) => dir,
        None => default_config_dir()?,
    };

    let completion = match command {
        Commands::Login => {
            let server = server.as_deref().unwrap_or(sync_client::DEFAULT_SERVER);
            login::run(&config_dir, server).await?;
            Completion::Complete
        }
        Commands::Upload {
            delete,
            force,
            dry_run,
            dataset,
            path,
        } => {
            let remote = connect(&config_dir, server.as_deref(), token.as_deref()).await?;
            if dataset.is_none() && !dry_run && !remote.is_authenticated() {
                anyhow::bail!("Creating a dataset requires a token. Run 'openneuro login' first.");
            }
            let args = UploadArgs {
                dataset,
                path,
                delete,
                force,
                dry_run,
            };
            upload::run(&engine(remote), args, commands::confirm).await?
        }
        Commands::Download {
            delete,
            snapshot,
            dry_run,
            dataset,
            path,
        } => {
            let remote = connect(&config_dir, server.as_deref(), token.as_deref()).await?;
            let args = DownloadArgs {
                dataset,
                version: snapshot,
                path,
                delete,
                dry_run,
            };
            download::run(&engine(remote), args).await?
        }
        Commands::Publish { dataset } => {
            let remote = connect(&config_dir, server.as_deref(), token.as_deref()).await?;
            publish::run(remote.as_ref(), &dataset).await?;
            Completion::Complete
        }
    };

    Ok(completion.exit_code())
}

/// Build the HTTP client from flags, environment and saved credentials.
async fn connect(
    config_dir: &Path,
    server: Option<&str>,
    token: Option<&str>,
) -> Result<Arc<HttpRemote>> {
    let stored = StoredCredentials::load(config_dir).await?;
    let client_config = resolve_credentials(server, token, stored.as_ref());
    tracing::debug!(?client_config, "resolved credentials");
    let remote = HttpRemote::new(client_config).context("Failed to create HTTP client")?;
    Ok(Arc::new(remote))
}

/// Engine with terminal progress bars, stopped by Ctrl-C.
fn engine(remote: Arc<HttpRemote>) -> SyncEngine<HttpRemote> {
    let interrupt = Interrupt::new();
    interrupt.trigger_on_ctrl_c();
    SyncEngine::new(remote)
        .with_progress(Arc::new(IndicatifCallback::new()))
        .with_interrupt(interrupt)
}

/// Install the stderr log subscriber. `RUST_LOG` takes precedence over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn engine_error(error: &anyhow::Error) -> Option<&EngineError> {
    error.downcast_ref::<EngineError>()
}

fn is_interrupt(error: &anyhow::Error) -> bool {
    engine_error(error).is_some_and(EngineError::is_interrupted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn upload_dataset_and_path_are_optional() {
        let cli = Cli::try_parse_from(["openneuro", "upload", "--force"]).unwrap();
        match cli.command {
            Commands::Upload {
                dataset,
                path,
                force,
                ..
            } => {
                assert!(dataset.is_none());
                assert_eq!(path, PathBuf::from("."));
                assert!(force);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn download_takes_snapshot_version() {
        let cli = Cli::try_parse_from([
            "openneuro",
            "download",
            "--version",
            "1.0.0",
            "ds000001",
            "out",
        ])
        .unwrap();
        match cli.command {
            Commands::Download {
                snapshot, dataset, ..
            } => {
                assert_eq!(snapshot.unwrap().as_str(), "1.0.0");
                assert_eq!(dataset.as_str(), "ds000001");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn invalid_dataset_id_is_rejected_at_parse_time() {
        let result = Cli::try_parse_from(["openneuro", "publish", "../ds000001"]);
        assert!(result.is_err());
    }

    #[test]
    fn interrupt_is_recognized_through_context() {
        let err = anyhow::Error::new(EngineError::Interrupted { partial: None }).context("Upload failed");
        assert!(is_interrupt(&err));
        assert!(!is_interrupt(&anyhow::anyhow!("other")));
    }

    #[test]
    fn partial_report_is_found_through_context() {
        let report = sync_core::SyncReport {
            dataset: DatasetId::new("ds000001").unwrap(),
            direction: sync_types::Direction::Download,
            synchronized: 1,
            transfers: sync_core::BatchReport::new(),
            deletions: None,
            orphans_kept: 0,
        };
        let err = anyhow::Error::new(EngineError::Interrupted {
            partial: Some(Box::new(report.clone())),
        })
        .context("Download failed");

        assert_eq!(engine_error(&err).and_then(EngineError::partial), Some(&report));
    }
}
