//! Disruption monitor binary

use anyhow::Context;
use disruption_monitor::{Config, DisruptionMonitor, MetricsRegistry, MetricsServer};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration first; logging settings live in it
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load_from_file(&path).with_context(|| format!("loading configuration from {}", path))?,
        None => Config::load().context("loading configuration")?,
    };

    let level = config.logging.level.as_deref().unwrap_or("info");
    common::logging::init_with_format(config.logging.format.as_deref(), level);

    tracing::info!(backends = config.backends.len(), "Disruption monitor starting");
    if config.backends.is_empty() {
        tracing::warn!("No backends configured, nothing to sample");
    }

    let shutdown = CancellationToken::new();

    let metrics = config.metrics.enabled.then(|| Arc::new(MetricsRegistry::new()));
    let metrics_task = metrics.clone().map(|registry| {
        let server = MetricsServer::new(registry, config.metrics.listen_addr.clone());
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                tracing::warn!(error = %e, "Metrics server error");
            }
        })
    });

    let monitor = DisruptionMonitor::from_config(&config, metrics).context("building samplers")?;

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl-C"),
            Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
        signal.cancel();
    });

    let report = monitor.run(&shutdown).await.context("running samplers")?;
    report
        .write(config.output.report_path.as_deref())
        .context("writing report")?;

    if let Some(task) = metrics_task {
        let _ = task.await;
    }

    tracing::info!("Disruption monitor stopped");
    Ok(())
}
