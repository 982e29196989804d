//! TrackMyMoney CLI - offline-first income and expense tracking
//!
//! Every edit lands in the local database first and is pushed to the
//! server when it can be reached.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::{resolve_config_path, resolve_db_path, AppContext};
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "tmm=info,tmm_core=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;
    let config_path = resolve_config_path(cli.config)?;
    let ctx = AppContext::open(&db_path, &config_path, cli.year).await?;

    match cli.command {
        Commands::Auth { command } => commands::auth::run(&ctx, command).await,
        Commands::Category { command } => commands::category::run(&ctx, command).await,
        Commands::Tx { command } => commands::tx::run(&ctx, command).await,
        Commands::Sync(args) => commands::sync::run(&ctx, args).await,
        Commands::Queue { json, clear, drop } => {
            commands::queue::run(&ctx, json, clear, drop).await
        }
        Commands::Stats { json } => commands::stats::run(&ctx, json).await,
    }
}
