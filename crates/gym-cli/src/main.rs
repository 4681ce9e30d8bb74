mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use gym_core::config::{Config, State};
use gym_core::models::CatalogKind;
use gym_core::DataAccess;
use tracing_subscriber::EnvFilter;

/// The error a user can fix by changing the command's arguments, if any
fn input_error(err: &anyhow::Error) -> Option<&gym_core::Error> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<gym_core::Error>())
        .filter(|e| e.is_validation())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries command output; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;
    let state = State::load()?;
    tracing::debug!(device = state.device_id(), "loaded configuration");
    let data = gym_core::initialize_offline_support(&config, &state)
        .await
        .context("Failed to open the local database")?;

    if let Err(err) = run(&data, cli).await {
        if let Some(e) = input_error(&err) {
            eprintln!("{} {e}", "Invalid input:".red());
            std::process::exit(2);
        }
        return Err(err);
    }
    Ok(())
}

async fn run(data: &DataAccess, cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Members(cmd) => cli::commands::members(data, cmd, cli.json).await?,
        Commands::Products(cmd) => cli::commands::products(data, cmd, cli.json).await?,
        Commands::Sales(cmd) => cli::commands::sales(data, cmd, cli.json).await?,
        Commands::Courses(cmd) => {
            cli::commands::catalog(data, CatalogKind::CoursePoints, cmd, cli.json).await?
        }
        Commands::Diet(cmd) => {
            cli::commands::catalog(data, CatalogKind::DietItems, cmd, cli.json).await?
        }
        Commands::Status => cli::commands::status(data, cli.json)?,
        Commands::Sync { pending } => cli::commands::sync(data, pending, cli.json).await?,
        Commands::Backup { dir } => cli::commands::backup(data, &dir, cli.json)?,
        Commands::Init { sample } => cli::commands::init(data, sample, cli.json).await?,
    }

    Ok(())
}
