//! Disruption monitor.
//!
//! Samples a set of configured HTTP backends until shutdown and reports how
//! long each of them was unavailable.
//!
//! # Components
//!
//! - **Config**: YAML backend list, sampling cadence, output and hooks
//! - **Monitor**: one [`disruption::BackendSampler`] per backend and
//!   connection type, started and stopped together
//! - **Report**: every interval plus per-backend disruption totals
//! - **Metrics**: Prometheus counters served over HTTP
//! - **Hooks**: a capture command run when a disruption begins

pub mod config;
pub mod hooks;
pub mod http_server;
pub mod metrics;
pub mod monitor;
pub mod report;

pub use config::{Config, ConfigError};
pub use hooks::{CaptureHook, MetricsHook};
pub use http_server::MetricsServer;
pub use metrics::{MeteredRecorder, MetricsRegistry};
pub use monitor::DisruptionMonitor;
pub use report::{BackendSummary, Report};
