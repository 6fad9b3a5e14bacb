//! Samples and the creation-ordered queue between producer and consumer.

use crate::prober::{CheckOutcome, ProbeError};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;
use tokio::sync::{Notify, oneshot};

/// One probe attempt, waiting to be evaluated by the consumer.
#[derive(Debug)]
pub struct Sample {
    start_time: SystemTime,
    done: oneshot::Receiver<CheckOutcome>,
}

impl Sample {
    /// When the check was started, not when it returned.
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// Wait for the check to finish.
    ///
    /// A check whose task went away without reporting counts as a failure.
    pub async fn finished(self) -> CheckOutcome {
        self.done
            .await
            .unwrap_or_else(|_| CheckOutcome::failed(String::new(), ProbeError::Abandoned))
    }
}

/// Write side of a [`Sample`], held by the task running the check.
#[derive(Debug)]
pub struct SampleCompleter {
    done: oneshot::Sender<CheckOutcome>,
}

impl SampleCompleter {
    /// Publish the check result. Consumes the completer, so a sample
    /// completes at most once.
    pub fn complete(self, outcome: CheckOutcome) {
        // The consumer only goes away once the queue is drained, so a closed
        // receiver means nobody is interested any more.
        let _ = self.done.send(outcome);
    }
}

/// Result of popping from the queue
#[derive(Debug)]
pub enum Next {
    Sample(Sample),
    /// Nothing queued right now, more may come
    Empty,
    /// Nothing queued and the producer has stopped
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    samples: VecDeque<Sample>,
    closed: bool,
}

/// FIFO of samples ordered by creation time.
///
/// Samples leave in the order they were pushed, regardless of the order in
/// which their checks complete.
#[derive(Debug, Default)]
pub struct SampleQueue {
    state: Mutex<QueueState>,
    available: Notify,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a new sample started at `start_time`.
    pub fn push(&self, start_time: SystemTime) -> SampleCompleter {
        let (tx, rx) = oneshot::channel();
        self.lock().samples.push_back(Sample {
            start_time,
            done: rx,
        });
        self.available.notify_one();
        SampleCompleter { done: tx }
    }

    /// Remove the oldest sample.
    pub fn pop_oldest(&self) -> Next {
        let mut state = self.lock();
        match state.samples.pop_front() {
            Some(sample) => Next::Sample(sample),
            None if state.closed => Next::Closed,
            None => Next::Empty,
        }
    }

    /// Wait for the oldest sample, or `None` once the queue is closed and drained.
    pub async fn next(&self) -> Option<Sample> {
        loop {
            match self.pop_oldest() {
                Next::Sample(sample) => return Some(sample),
                Next::Closed => return None,
                Next::Empty => self.available.notified().await,
            }
        }
    }

    /// Signal that no more samples will be pushed.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
