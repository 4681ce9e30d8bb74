use anyhow::{Context, Result};
use clap::Parser;
use gym_server::config::Settings;
use gym_server::remote_db::RemoteDb;
use gym_server::{router, AppState};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gym-server", about = "gymdesk sync server")]
struct Args {
    /// Path to server configuration TOML file
    #[arg(long, default_value = "~/.config/gym/server.toml")]
    config: String,
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => Ok(dirs::home_dir()
            .context("Could not determine home directory")?
            .join(rest)),
        None => Ok(PathBuf::from(path)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config_path = expand_home(&args.config)?;
    let settings = Settings::from_file(&config_path)?;

    let data_dir = settings.data_dir();
    let db = RemoteDb::new(&data_dir)
        .await
        .with_context(|| format!("failed to open database in {}", data_dir.display()))?;
    if settings.server.api_token.is_none() {
        tracing::warn!("no api_token configured, sync routes are open");
    }
    let app = router(AppState::new(db, settings.server.api_token.clone()));

    let addr = settings.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("gym-server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
