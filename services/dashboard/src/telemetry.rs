use crate::config::{LoggingConfig, ServiceConfig};
use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging. `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer().pretty()).init();
    }
}

/// Initialize Prometheus metrics exporter
pub fn init_metrics(config: &ServiceConfig) -> Result<()> {
    if !config.metrics_enabled {
        return Ok(());
    }

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = config.metrics_port, "Prometheus metrics exporter started");

    Ok(())
}
