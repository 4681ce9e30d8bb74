use anyhow::{Context, Result};
use clap::Parser;
use gym_core::config::{Config, State};
use gym_core::DataAccess;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gym-syncd", about = "Background sync daemon for gymdesk")]
struct Args {
    /// Path to the client configuration file (defaults to GYM_CONFIG or
    /// ~/.config/gym/config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Seconds between status lines in the log
    #[arg(long, default_value_t = 300)]
    status_every: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => Ok(dirs::home_dir()
            .context("Could not determine home directory")?
            .join(rest)),
        None => Ok(PathBuf::from(path)),
    }
}

fn log_status(data: &DataAccess) {
    match (data.get_pending_operations_count(), data.get_last_sync_time()) {
        (Ok(pending), Ok(last_sync)) => tracing::info!(
            online = data.is_online(),
            pending,
            last_sync = ?last_sync,
            "status"
        ),
        (Err(e), _) | (_, Err(e)) => tracing::error!("cannot read sync state: {e}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => Config::load_from(&expand_home(path)?)?,
        None => Config::load()?,
    };
    let state = State::load()?;

    if config.sync.server_url.is_none() {
        tracing::warn!("no sync.server_url configured, nothing will be replayed");
    }
    tracing::info!(
        device = state.device_id(),
        database = %config.database_path()?.display(),
        "gym-syncd starting"
    );

    // probing and replay run in tasks owned by the data layer
    let data = gym_core::initialize_offline_support(&config, &state).await?;
    let _transitions = data.on_connection_change(|online| {
        tracing::info!(online, "connectivity changed");
    });
    log_status(&data);

    let mut status_timer = tokio::time::interval(Duration::from_secs(args.status_every.max(1)));
    status_timer.tick().await;

    loop {
        tokio::select! {
            _ = status_timer.tick() => log_status(&data),

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received shutdown signal, stopping gym-syncd");
                break;
            }
        }
    }

    // one last attempt so a clean shutdown leaves as little queued as possible
    if !data.is_local_only() && data.is_online() {
        match data.force_sync_with_server().await {
            Ok(report) => tracing::info!(remaining = report.remaining, "final sync done"),
            Err(e) => tracing::warn!("final sync failed: {e}"),
        }
    }
    Ok(())
}
