//! Folding the sample stream into disruption intervals.

use crate::hook::{SamplerHook, notify_disruption_started};
use crate::locator::Locator;
use crate::message::{disruption_began, disruption_ended};
use crate::prober::CheckOutcome;
use crate::recorder::Recorder;
use crate::sample::SampleQueue;
use crate::types::{ConnectionType, Interval, IntervalHandle, IntervalLevel};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Error assumed before the first sample, so the first sample always opens an interval.
const NEVER_CHECKED: &str = "never checked before";

/// What a sample means relative to the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Available before and now
    StillAvailable,
    /// Failing with the same error as before
    StillDisrupted,
    /// A new disruption starts, either from available or with a different error
    DisruptionBegan,
    /// The backend recovered
    DisruptionEnded,
}

/// Classify a sample.
///
/// `previous_error` and `current_error` are the error texts of the previous
/// and current sample, `None` when that sample passed.
pub fn classify(previous_error: Option<&str>, current_error: Option<&str>, first_sample: bool) -> Transition {
    match (previous_error, current_error) {
        (None, None) => Transition::StillAvailable,
        (Some(previous), Some(current)) if previous == current && !first_sample => {
            Transition::StillDisrupted
        }
        (Some(_), Some(_)) => Transition::DisruptionBegan,
        (None, Some(_)) => Transition::DisruptionBegan,
        (Some(_), None) => Transition::DisruptionEnded,
    }
}

/// Consumer side of a sampler: turns completed samples into intervals.
pub struct DisruptionConsumer {
    locator: Locator,
    locator_text: String,
    connection_type: ConnectionType,
    sample_interval: Duration,
    recorder: Arc<dyn Recorder>,
    hooks: Vec<Arc<dyn SamplerHook>>,

    first_sample: bool,
    previous_error: Option<String>,
    previous_interval: Option<IntervalHandle>,
    previous_sample_time: Option<SystemTime>,
}

impl DisruptionConsumer {
    pub fn new(
        locator: Locator,
        connection_type: ConnectionType,
        sample_interval: Duration,
        recorder: Arc<dyn Recorder>,
        hooks: Vec<Arc<dyn SamplerHook>>,
    ) -> Self {
        Self {
            locator_text: locator.to_string(),
            locator,
            connection_type,
            sample_interval,
            recorder,
            hooks,
            first_sample: true,
            previous_error: Some(NEVER_CHECKED.to_string()),
            previous_interval: None,
            previous_sample_time: None,
        }
    }

    /// Drain `queue` in creation order until it is closed and empty, then
    /// close any interval left open.
    pub async fn run(mut self, queue: &SampleQueue) {
        while let Some(sample) = queue.next().await {
            let start_time = sample.start_time();
            let outcome = sample.finished().await;
            self.observe(start_time, &outcome);
        }
        self.finish();
    }

    /// Apply one completed sample.
    pub fn observe(&mut self, start_time: SystemTime, outcome: &CheckOutcome) {
        if outcome.cancelled {
            debug!(locator = %self.locator_text, "Skipping sample interrupted by cancellation");
            return;
        }

        let current_error = outcome.error.as_ref().map(ToString::to_string);
        let transition = classify(
            self.previous_error.as_deref(),
            current_error.as_deref(),
            self.first_sample,
        );

        match (transition, current_error.as_deref()) {
            (Transition::StillAvailable | Transition::StillDisrupted, _) => {}
            (Transition::DisruptionBegan, Some(error)) => {
                self.close_previous(start_time);
                notify_disruption_started(&self.hooks, &self.locator_text);

                let (message, level) = disruption_began(
                    &self.locator_text,
                    self.connection_type,
                    error,
                    &outcome.correlation_id,
                );
                match level {
                    IntervalLevel::Error => warn!(locator = %self.locator_text, "{}", message.human_message),
                    _ => info!(locator = %self.locator_text, "{}", message.human_message),
                }
                let interval = Interval::open(self.locator.clone(), level, message, start_time).displayed();
                self.previous_interval = Some(self.recorder.start_interval(interval));
            }
            (Transition::DisruptionEnded, _) => {
                self.close_previous(start_time);

                let message = disruption_ended(&self.locator_text, self.connection_type);
                info!(locator = %self.locator_text, "{}", message.human_message);
                let interval = Interval::open(self.locator.clone(), IntervalLevel::Info, message, start_time);
                self.previous_interval = Some(self.recorder.start_interval(interval));
            }
            (Transition::DisruptionBegan, None) => {
                unreachable!("classify reported a disruption for a passing sample")
            }
        }

        self.first_sample = false;
        self.previous_error = current_error;
        self.previous_sample_time = Some(start_time);
    }

    /// Close the last open interval. The real end is unknown, so it is
    /// estimated as one sample interval after the last sample.
    pub fn finish(&mut self) {
        if let (Some(handle), Some(last)) = (self.previous_interval.take(), self.previous_sample_time) {
            self.recorder.end_interval(handle, last + self.sample_interval);
        }
    }

    fn close_previous(&mut self, at: SystemTime) {
        if let Some(handle) = self.previous_interval.take() {
            self.recorder.end_interval(handle, at);
        }
    }
}
