//! Drowsiness Analysis Service - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, ServiceConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::load().context("Failed to load configuration")?;
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    info!("=== Drowsiness Analysis Service v{} ===", env!("CARGO_PKG_VERSION"));

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    run_server(config, Some(metrics)).await
}
