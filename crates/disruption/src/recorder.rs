//! Interval recorders.

use crate::types::{Interval, IntervalHandle};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;
use tracing::warn;

/// Append-only sink of disruption intervals.
///
/// The sampler never reads intervals back; it only opens them and later
/// closes them through the returned handle.
pub trait Recorder: Send + Sync {
    /// Record a new, still open interval.
    fn start_interval(&self, interval: Interval) -> IntervalHandle;

    /// Close a previously started interval.
    fn end_interval(&self, handle: IntervalHandle, to: SystemTime);
}

/// Recorder keeping every interval in memory
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    intervals: Mutex<Vec<Interval>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all intervals in the order they were started.
    pub fn intervals(&self) -> Vec<Interval> {
        self.intervals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.intervals.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Recorder for MemoryRecorder {
    fn start_interval(&self, interval: Interval) -> IntervalHandle {
        let mut intervals = self.intervals.lock().unwrap_or_else(PoisonError::into_inner);
        intervals.push(interval);
        IntervalHandle(intervals.len() - 1)
    }

    fn end_interval(&self, handle: IntervalHandle, to: SystemTime) {
        let mut intervals = self.intervals.lock().unwrap_or_else(PoisonError::into_inner);
        match intervals.get_mut(handle.0) {
            Some(interval) => interval.to = Some(to),
            None => warn!(handle = handle.0, "Ignoring end of unknown interval"),
        }
    }
}
