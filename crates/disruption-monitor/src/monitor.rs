//! Runs one sampler per configured backend and connection type.

use crate::config::{Config, ConfigError};
use crate::hooks::{CaptureHook, MetricsHook};
use crate::metrics::{MeteredRecorder, MetricsRegistry};
use crate::report::Report;
use disruption::{BackendSampler, MemoryRecorder, Recorder, SamplerHook};
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Owns the samplers of a monitoring run and the intervals they record
pub struct DisruptionMonitor {
    samplers: Vec<Arc<BackendSampler>>,

    /// Where intervals end up
    intervals: Arc<MemoryRecorder>,

    /// What the samplers write to; counts intervals when metrics are enabled
    recorder: Arc<dyn Recorder>,

    /// Metrics registry (optional)
    metrics: Option<Arc<MetricsRegistry>>,
}

impl DisruptionMonitor {
    /// Create a monitor for already built samplers
    pub fn new(samplers: Vec<Arc<BackendSampler>>, metrics: Option<Arc<MetricsRegistry>>) -> Self {
        let intervals = Arc::new(MemoryRecorder::new());
        let recorder: Arc<dyn Recorder> = match &metrics {
            Some(m) => Arc::new(MeteredRecorder::new(intervals.clone(), m.clone())),
            None => intervals.clone(),
        };
        Self {
            samplers,
            intervals,
            recorder,
            metrics,
        }
    }

    /// Build one sampler per backend and connection type
    pub fn from_config(config: &Config, metrics: Option<Arc<MetricsRegistry>>) -> Result<Self, ConfigError> {
        let capture: Option<Arc<dyn SamplerHook>> = config
            .capture
            .as_ref()
            .map(|settings| Arc::new(CaptureHook::new(settings, metrics.clone())) as Arc<dyn SamplerHook>);

        let mut samplers = Vec::new();
        for backend in &config.backends {
            for &connection_type in &backend.connection_types {
                let mut builder = backend.sampler_builder(connection_type, config.sampler.interval)?;
                if let Some(ref m) = metrics {
                    let hook = MetricsHook::new(
                        builder.locator().backend_disruption_name(),
                        connection_type.to_string(),
                        m.clone(),
                    );
                    builder = builder.sampler_hook(Arc::new(hook));
                }
                if let Some(hook) = &capture {
                    builder = builder.sampler_hook(hook.clone());
                }

                let sampler = builder.build()?;
                info!(locator = %sampler.locator(), "Configured sampler");
                samplers.push(Arc::new(sampler));
            }
        }

        Ok(Self::new(samplers, metrics))
    }

    pub fn samplers(&self) -> &[Arc<BackendSampler>] {
        &self.samplers
    }

    /// Sample every backend until `shutdown` fires, then stop all samplers
    /// and report what they recorded.
    pub async fn run(&self, shutdown: &CancellationToken) -> common::Result<Report> {
        info!(samplers = self.samplers.len(), "Starting disruption monitoring");

        for (started, sampler) in self.samplers.iter().enumerate() {
            if let Err(e) = sampler.start_endpoint_monitoring(shutdown, self.recorder.clone()) {
                warn!(locator = %sampler.locator(), error = %e, "Failed to start sampler");
                if let Err(stop_err) = self.stop_all(&self.samplers[..started]).await {
                    warn!(error = %stop_err, "Failed to stop samplers after start failure");
                }
                return Err(e);
            }
        }
        if let Some(ref m) = self.metrics {
            m.update_samplers_active(self.samplers.len());
        }

        shutdown.cancelled().await;
        info!("Shutdown requested, stopping samplers");
        let stopped = self.stop_all(&self.samplers).await;

        if let Some(ref m) = self.metrics {
            m.update_samplers_active(0);
        }
        stopped?;

        let report = Report::new(self.intervals.intervals());
        for summary in &report.backends {
            info!(
                locator = %summary.locator,
                disruptions = summary.disruptions,
                disruption_seconds = summary.disruption_seconds,
                "Backend disruption summary"
            );
        }
        Ok(report)
    }

    /// Stop every sampler, then fail with the first error seen.
    async fn stop_all(&self, samplers: &[Arc<BackendSampler>]) -> common::Result<()> {
        let results = join_all(samplers.iter().map(|s| s.stop())).await;
        let mut first_error = None;
        for (sampler, result) in samplers.iter().zip(results) {
            if let Err(e) = result {
                error!(locator = %sampler.locator(), error = %e, "Sampler lost samples while stopping");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
