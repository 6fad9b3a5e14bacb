//! Disruption report written when monitoring ends.

use disruption::locator::CONNECTION_KEY;
use disruption::{Interval, IntervalLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

/// Totals for one backend and connection type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSummary {
    pub locator: String,
    pub backend: String,
    pub connection: String,
    /// Error-level intervals
    pub disruptions: usize,
    /// Total time spent in error-level intervals
    pub disruption_seconds: f64,
    /// Total time spent in warning-level intervals
    pub warning_seconds: f64,
}

/// Every recorded interval plus per-backend totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(with = "humantime_serde")]
    pub generated_at: SystemTime,
    pub backends: Vec<BackendSummary>,
    pub intervals: Vec<Interval>,
}

impl Report {
    pub fn new(intervals: Vec<Interval>) -> Self {
        let mut summaries: BTreeMap<String, BackendSummary> = BTreeMap::new();

        for interval in &intervals {
            let locator = interval.locator.to_string();
            let summary = summaries.entry(locator.clone()).or_insert_with(|| BackendSummary {
                locator,
                backend: interval.locator.backend_disruption_name().to_string(),
                connection: interval.locator.get(CONNECTION_KEY).unwrap_or_default().to_string(),
                disruptions: 0,
                disruption_seconds: 0.0,
                warning_seconds: 0.0,
            });

            let seconds = interval.duration().map(|d| d.as_secs_f64()).unwrap_or_default();
            match interval.level {
                IntervalLevel::Error => {
                    summary.disruptions += 1;
                    summary.disruption_seconds += seconds;
                }
                IntervalLevel::Warning => summary.warning_seconds += seconds,
                IntervalLevel::Info => {}
            }
        }

        Self {
            generated_at: SystemTime::now(),
            backends: summaries.into_values().collect(),
            intervals,
        }
    }

    /// Summary for a backend disruption name, first match.
    pub fn backend(&self, backend: &str) -> Option<&BackendSummary> {
        self.backends.iter().find(|b| b.backend == backend)
    }

    /// Write the report as pretty JSON to `path`, or to stdout.
    pub fn write(&self, path: Option<&Path>) -> common::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        match path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, json)?;
                tracing::info!(path = %path.display(), "Wrote disruption report");
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{}", json)?;
            }
        }
        Ok(())
    }
}
