use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use portcullis::{PortcullisBuilder, PortcullisError, config};
use tracing_subscriber::EnvFilter;

/// Command line interface for Portcullis
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env = "PORTCULLIS_DATABASE_URL")]
    database_url: String,

    /// TOML file with throttle and login settings
    #[arg(long, env = "PORTCULLIS_CONFIG")]
    config: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(clap::Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Show the lockout that would block a login right now
    Status {
        #[arg(long)]
        email: String,
        #[arg(long)]
        ip: String,
        /// Print the lockout as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete old login attempts, expired sessions, stale unverified accounts
    /// and long-deleted accounts
    Prune,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), PortcullisError> {
    let settings = match &cli.config {
        Some(path) => config::load(path)?,
        None => Default::default(),
    };

    let portcullis = PortcullisBuilder::new()
        .with_config(settings)
        .with_sqlite(&cli.database_url)
        .await
        .map_err(|e| PortcullisError::StorageError(e.to_string()))?
        .build()
        .await
        .map_err(|e| PortcullisError::ConfigError(e.to_string()))?;

    match cli.command {
        Commands::Migrate => {
            tracing::info!("Running migrations");
            portcullis.migrate().await?;
            tracing::info!("Migrations complete");
        }
        Commands::Status { email, ip, json } => {
            let status = portcullis.lockout_status(&email, &ip).await?;
            if json {
                let rendered = serde_json::to_string_pretty(&status)
                    .map_err(|e| PortcullisError::StorageError(e.to_string()))?;
                println!("{rendered}");
            } else {
                match status {
                    Some(lockout) => println!(
                        "locked ({} scope) for {} more minute(s), until {}",
                        lockout.scope,
                        lockout.minutes_remaining,
                        lockout
                            .locked_until
                            .map(|until| until.to_rfc3339())
                            .unwrap_or_default()
                    ),
                    None => println!("not locked"),
                }
            }
        }
        Commands::Prune => {
            let attempts = portcullis.prune_attempts().await?;
            let sessions = portcullis.cleanup_expired_sessions().await?;
            let accounts = portcullis.prune_accounts().await?;
            tracing::info!(
                attempts,
                sessions,
                deactivated = accounts.deactivated,
                purged = accounts.purged,
                "Pruned expired records"
            );
        }
    }

    Ok(())
}
