//! Prometheus metrics for the disruption monitor.

use disruption::{Interval, IntervalHandle, IntervalLevel, Recorder, locator::CONNECTION_KEY};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

/// Labels for per-sampler metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BackendLabels {
    /// Backend disruption name
    pub backend: String,
    /// Connection type (new, reused)
    pub connection: String,
}

/// Labels for interval metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct IntervalLabels {
    /// Backend disruption name
    pub backend: String,
    /// Connection type (new, reused)
    pub connection: String,
    /// Interval level (info, warning, error)
    pub level: String,
}

/// Labels for capture hook metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CaptureLabels {
    /// Outcome (started, skipped, failed)
    pub result: String,
}

/// Metrics registry with all disruption monitor metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Intervals opened
    intervals_started_total: Family<IntervalLabels, Counter>,
    /// Length of closed intervals
    interval_duration_seconds: Family<IntervalLabels, Histogram>,
    /// Disruption hook invocations
    disruptions_started_total: Family<BackendLabels, Counter>,
    /// Capture command runs
    captures_total: Family<CaptureLabels, Counter>,
    /// Samplers currently running
    samplers_active: Gauge,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let intervals_started_total = Family::<IntervalLabels, Counter>::default();
        registry.register(
            "disruption_intervals_started",
            "Total availability intervals opened",
            intervals_started_total.clone(),
        );

        let interval_duration_seconds = Family::<IntervalLabels, Histogram>::new_with_constructor(|| {
            // 1s to ~4.5h
            Histogram::new(exponential_buckets(1.0, 2.0, 15))
        });
        registry.register(
            "disruption_interval_duration_seconds",
            "Length of closed availability intervals in seconds",
            interval_duration_seconds.clone(),
        );

        let disruptions_started_total = Family::<BackendLabels, Counter>::default();
        registry.register(
            "disruption_started",
            "Total disruptions detected",
            disruptions_started_total.clone(),
        );

        let captures_total = Family::<CaptureLabels, Counter>::default();
        registry.register(
            "disruption_captures",
            "Capture command runs by result",
            captures_total.clone(),
        );

        let samplers_active = Gauge::default();
        registry.register(
            "disruption_samplers_active",
            "Number of running samplers",
            samplers_active.clone(),
        );

        Self {
            registry,
            intervals_started_total,
            interval_duration_seconds,
            disruptions_started_total,
            captures_total,
            samplers_active,
        }
    }

    /// Record an interval being opened
    pub fn record_interval_started(&self, labels: &IntervalLabels) {
        self.intervals_started_total.get_or_create(labels).inc();
    }

    /// Record an interval being closed
    pub fn record_interval_ended(&self, labels: &IntervalLabels, duration: Duration) {
        self.interval_duration_seconds
            .get_or_create(labels)
            .observe(duration.as_secs_f64());
    }

    /// Record a disruption hook invocation
    pub fn record_disruption_started(&self, backend: &str, connection: &str) {
        self.disruptions_started_total
            .get_or_create(&BackendLabels {
                backend: backend.to_string(),
                connection: connection.to_string(),
            })
            .inc();
    }

    /// Record a capture hook outcome
    pub fn record_capture(&self, result: &str) {
        self.captures_total
            .get_or_create(&CaptureLabels {
                result: result.to_string(),
            })
            .inc();
    }

    /// Update running sampler count
    pub fn update_samplers_active(&self, count: usize) {
        self.samplers_active.set(count as i64);
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn level_label(level: IntervalLevel) -> String {
    match level {
        IntervalLevel::Info => "info".to_string(),
        IntervalLevel::Warning => "warning".to_string(),
        IntervalLevel::Error => "error".to_string(),
    }
}

/// Labels describing an interval
pub fn interval_labels(interval: &Interval) -> IntervalLabels {
    IntervalLabels {
        backend: interval.locator.backend_disruption_name().to_string(),
        connection: interval.locator.get(CONNECTION_KEY).unwrap_or_default().to_string(),
        level: level_label(interval.level),
    }
}

/// Recorder that counts intervals before passing them on
pub struct MeteredRecorder {
    inner: Arc<dyn Recorder>,
    metrics: Arc<MetricsRegistry>,
    open: Mutex<HashMap<IntervalHandle, (IntervalLabels, SystemTime)>>,
}

impl MeteredRecorder {
    pub fn new(inner: Arc<dyn Recorder>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            inner,
            metrics,
            open: Mutex::new(HashMap::new()),
        }
    }
}

impl Recorder for MeteredRecorder {
    fn start_interval(&self, interval: Interval) -> IntervalHandle {
        let labels = interval_labels(&interval);
        let from = interval.from;
        self.metrics.record_interval_started(&labels);

        let handle = self.inner.start_interval(interval);
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, (labels, from));
        handle
    }

    fn end_interval(&self, handle: IntervalHandle, to: SystemTime) {
        let opened = self
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        if let Some((labels, from)) = opened {
            if let Ok(duration) = to.duration_since(from) {
                self.metrics.record_interval_ended(&labels, duration);
            }
        }
        self.inner.end_interval(handle, to);
    }
}
