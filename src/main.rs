//! Quorum - multi-agent trading decision orchestrator.
//!
//! Headless binary: no UI, no HTTP server. Decisions stream to the
//! append-only journal; metrics are push-based via structured logs.
//!
//! # Usage
//! ```sh
//! quorum --config quorum.toml run
//! quorum --config quorum.toml trigger BTC/USDT
//! quorum --config quorum.toml validate-config
//! quorum --config quorum.toml dump-journal --since 2024-03-01T00:00:00Z
//! ```
//!
//! # Exit codes
//! 0 success, 2 invalid configuration, 3 provider auth failure at
//! startup, 1 anything else.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use quorum::application::system::{App, Collaborators};
use quorum::config::{AppConfig, ConfigError};
use quorum::infrastructure::journal::read_records;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "quorum", version, about = "Multi-agent crypto decision orchestrator")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "quorum.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the orchestrator and run until Ctrl+C.
    Run,
    /// Fire one manual cycle for a configured pair (e.g. BTC/USDT).
    Trigger { pair: String },
    /// Parse and validate the configuration, then exit.
    ValidateConfig,
    /// Print journal records as JSON lines, optionally bounded by time.
    DumpJournal {
        /// RFC 3339 lower bound on trigger fire time.
        #[arg(long)]
        since: Option<String>,
    },
}

const EXIT_CONFIG: u8 = 2;
const EXIT_AUTH: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration rejected: {}", err);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let result = match cli.command {
        Command::Run => run(config).await,
        Command::Trigger { pair } => trigger(config, &pair).await,
        Command::ValidateConfig => {
            info!(
                "Configuration OK: {} pairs, {} providers, {} analysts",
                config.pairs.len(),
                config.providers.len(),
                config.analysts.len()
            );
            Ok(())
        }
        Command::DumpJournal { since } => dump_journal(config, since.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            match err.downcast_ref::<ConfigError>() {
                Some(ConfigError::MissingCredentials { .. }) => ExitCode::from(EXIT_AUTH),
                Some(_) => ExitCode::from(EXIT_CONFIG),
                None => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(config: AppConfig) -> Result<()> {
    info!("Quorum {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Environment: {:?}, pairs: {}",
        config.deploy_env(),
        config
            .pairs
            .iter()
            .map(|p| format!("{}/{}@{}", p.base, p.quote, p.interval))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut app = App::build(config, Collaborators::simulated()).await?;
    app.start();
    info!("Orchestrator running. Press Ctrl+C to shut down.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    app.shutdown().await;
    Ok(())
}

async fn trigger(config: AppConfig, pair: &str) -> Result<()> {
    let app = App::build(config, Collaborators::simulated()).await?;
    let record = app.run_once(pair).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    app.shutdown().await;
    Ok(())
}

fn dump_journal(config: AppConfig, since: Option<&str>) -> Result<()> {
    let since = since
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| anyhow::anyhow!("invalid --since timestamp '{}': {}", raw, e))
        })
        .transpose()?;

    let records = read_records(&config.journal.path, since)?;
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    info!("{} records", records.len());
    Ok(())
}
