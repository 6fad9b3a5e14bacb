//! Sampler hooks used by the monitor.

use crate::config::CaptureSettings;
use crate::metrics::MetricsRegistry;
use disruption::SamplerHook;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Runs a capture command (e.g. a packet capture) for a bounded time when a
/// disruption begins. Only one capture runs at a time; disruptions seen while
/// a capture is running are skipped.
pub struct CaptureHook {
    command: String,
    args: Vec<String>,
    duration: Duration,
    running: Arc<AtomicBool>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl CaptureHook {
    pub fn new(settings: &CaptureSettings, metrics: Option<Arc<MetricsRegistry>>) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
            duration: settings.duration,
            running: Arc::new(AtomicBool::new(false)),
            metrics,
        }
    }

    /// Whether a capture is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn record(&self, result: &str) {
        if let Some(ref m) = self.metrics {
            m.record_capture(result);
        }
    }
}

impl SamplerHook for CaptureHook {
    fn disruption_started(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(command = %self.command, "Capture already running, skipping");
            self.record("skipped");
            return;
        }

        let mut command = Command::new(&self.command);
        command.args(&self.args).kill_on_drop(true);
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %self.command, error = %e, "Failed to start capture");
                self.running.store(false, Ordering::SeqCst);
                self.record("failed");
                return;
            }
        };
        info!(command = %self.command, duration = ?self.duration, "Capture started");
        self.record("started");

        let running = self.running.clone();
        let duration = self.duration;
        let name = self.command.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(duration, child.wait()).await {
                Ok(Ok(status)) => info!(command = %name, %status, "Capture exited"),
                Ok(Err(e)) => warn!(command = %name, error = %e, "Failed to wait for capture"),
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(command = %name, error = %e, "Failed to stop capture");
                    }
                    info!(command = %name, "Capture stopped after time limit");
                }
            }
            running.store(false, Ordering::SeqCst);
        });
    }
}

/// Counts disruptions per sampler
pub struct MetricsHook {
    backend: String,
    connection: String,
    metrics: Arc<MetricsRegistry>,
}

impl MetricsHook {
    pub fn new(backend: impl Into<String>, connection: impl Into<String>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            backend: backend.into(),
            connection: connection.into(),
            metrics,
        }
    }
}

impl SamplerHook for MetricsHook {
    fn disruption_started(&self) {
        self.metrics.record_disruption_started(&self.backend, &self.connection);
    }
}
