use anyhow::{Context, Result};
use posture_dashboard::api::{start_api_server, AppState};
use posture_dashboard::config::Config;
use posture_dashboard::event_store::EventStore;
use posture_dashboard::image_store::LocalImageStore;
use posture_dashboard::ingest::{IngestSettings, Ingestor};
use posture_dashboard::telemetry::{init_metrics, init_tracing};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.logging);

    config.validate().context("Invalid configuration")?;

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting posture dashboard"
    );

    init_metrics(&config.service)?;

    let image_store = Arc::new(
        LocalImageStore::new(&config.storage.upload_dir)
            .await
            .context("Failed to initialize upload directory")?,
    );

    let settings = IngestSettings {
        layout: config.pixel_layout(),
        fallback_resolution: config.fallback_resolution(),
        keep_raw: config.storage.keep_raw,
    };
    info!(
        layout = %settings.layout,
        fallback = ?settings.fallback_resolution,
        keep_raw = settings.keep_raw,
        "RGB565 decoder configured"
    );

    let ingestor = Arc::new(Ingestor::new(
        image_store,
        Arc::new(EventStore::new()),
        settings,
    ));

    let state = AppState {
        ingestor,
        service_name: config.service.name.clone(),
    };

    start_api_server(state, &config.api, shutdown_signal()).await?;

    info!("Dashboard stopped");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
