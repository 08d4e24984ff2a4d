//! Segmentator — dynamic user segmentation service.
//!
//! Main entry point: loads configuration, connects the store, starts the
//! TTL sweeper and the HTTP server, and shuts both down in order on SIGINT.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use segmentator_api::ApiServer;
use segmentator_core::AppConfig;
use segmentator_segments::TtlSweeper;
use segmentator_store::Db;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "segmentator")]
#[command(about = "Dynamic user segmentation service")]
#[command(version)]
struct Cli {
    /// HTTP port (overrides config)
    #[arg(long, env = "SEGMENTATOR__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// SQLite database path (overrides config)
    #[arg(long, env = "SEGMENTATOR__STORE__PATH")]
    db_path: Option<String>,

    /// TTL sweep interval in seconds (overrides config)
    #[arg(long, env = "SEGMENTATOR__SWEEPER__INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "segmentator=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("segmentator starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(path) = cli.db_path {
        config.store.path = path;
    }
    if let Some(secs) = cli.sweep_interval_secs {
        config.sweeper.interval_secs = secs;
    }

    info!(
        http_port = config.api.http_port,
        db_path = %config.store.path,
        sweep_interval_secs = config.sweeper.interval_secs,
        "configuration loaded"
    );

    // Connect the store (bounded retry loop for late-attaching storage)
    let db = Arc::new(Db::connect(&config.store)?);

    // Start the TTL sweeper — the single background task of the process
    let sweeper = TtlSweeper::new(
        db.clone(),
        Duration::from_secs(config.sweeper.interval_secs),
    );
    let sweeper_handle = sweeper.spawn();

    // Start API server
    let api_server = ApiServer::new(config.clone(), db);

    if let Err(e) = api_server.start_metrics().await {
        tracing::error!(error = %e, "failed to start metrics exporter");
    }

    info!("segmentator is ready to serve traffic");

    // Serve until SIGINT; the sweeper stops after the listener drains so an
    // in-flight tick can finish.
    api_server
        .start_http(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    sweeper_handle.shutdown().await;

    info!("segmentator stopped");
    Ok(())
}
