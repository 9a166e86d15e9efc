//! notesync-relay binary entry point.
//!
//! Usage:
//! ```bash
//! notesync-relay --config relay.toml
//! notesync-relay --help
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sync_relay::cleanup::spawn_cleanup_task;
use sync_relay::{build_router, Config, SqliteReplicaStore, SyncRelay};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "notesync-relay")]
#[command(about = "Zero-knowledge replica server for notesync")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file (defaults apply when it does not exist)
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    /// Override `server.bind_address`
    #[arg(long)]
    bind: Option<String>,

    /// Override `storage.database`
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(database) = cli.database {
        config.storage.database = database;
    }
    config.validate()?;

    let storage = SqliteReplicaStore::new(&config.storage.database)
        .await
        .with_context(|| format!("opening {}", config.storage.database.display()))?;
    let relay = Arc::new(SyncRelay::new(config.clone(), Arc::new(storage)));

    let cleanup = spawn_cleanup_task(
        relay.storage_arc(),
        relay.rate_limits().clone(),
        config.cleanup.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("binding {}", config.server.bind_address))?;
    tracing::info!(
        "notesync-relay v{} listening on {} (database: {}, min client: {})",
        env!("CARGO_PKG_VERSION"),
        config.server.bind_address,
        config.storage.database.display(),
        config.server.min_client_version
    );

    axum::serve(listener, build_router(relay))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cleanup.abort();
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
