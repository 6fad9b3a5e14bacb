//! Producer loop and monitoring lifecycle.
//!
//! A monitoring session runs two long lived tasks:
//! - the producer creates a sample every tick and spawns its check
//! - the consumer drains samples in creation order into the recorder
//!
//! Checks are never awaited by the producer, so a hung request cannot delay
//! the next sample. The consumer waits for each sample in turn, which keeps
//! the recorded intervals ordered by start time.

use crate::consumer::DisruptionConsumer;
use crate::prober::BackendSampler;
use crate::recorder::Recorder;
use crate::sample::SampleQueue;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How often `stop` reports that it is still waiting for the consumer
const STOP_WAIT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Handles of a running monitoring session
#[derive(Debug, Clone)]
pub(crate) struct Session {
    /// Cancels producer, consumer and in-flight checks
    cancel: CancellationToken,
    /// Cancelled by the consumer once it has drained every sample
    consumption_finished: CancellationToken,
    queue: Arc<SampleQueue>,
}

impl BackendSampler {
    /// Whether a monitoring session is active.
    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Validate, register and spawn a new session.
    fn begin_session(self: &Arc<Self>, parent: &CancellationToken, recorder: Arc<dyn Recorder>) -> common::Result<Session> {
        let mut current = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            return Err(common::Error::AlreadyRunning(self.locator.to_string()));
        }
        self.http_client().map_err(common::Error::config)?;

        let session = Session {
            cancel: parent.child_token(),
            consumption_finished: CancellationToken::new(),
            queue: Arc::new(SampleQueue::new()),
        };
        *current = Some(session.clone());
        drop(current);

        info!(
            locator = %self.locator,
            interval_ms = self.sample_interval.as_millis() as u64,
            "Starting endpoint monitoring"
        );

        tokio::spawn(self.clone().produce_samples(session.queue.clone(), session.cancel.clone()));

        let consumer = DisruptionConsumer::new(
            self.locator.clone(),
            self.connection_type,
            self.sample_interval,
            recorder,
            self.hooks.clone(),
        );
        let queue = session.queue.clone();
        let finished = session.consumption_finished.clone();
        tokio::spawn(async move {
            consumer.run(&queue).await;
            finished.cancel();
        });

        Ok(session)
    }

    /// Wait for a session to end and check nothing was left behind.
    async fn await_session(&self, session: Session) -> common::Result<()> {
        session.cancel.cancelled().await;
        session.consumption_finished.cancelled().await;

        {
            let mut current = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            if current
                .as_ref()
                .is_some_and(|s| Arc::ptr_eq(&s.queue, &session.queue))
            {
                *current = None;
            }
        }

        self.check_drained(&session.queue)?;
        info!(locator = %self.locator, "Endpoint monitoring finished");
        Ok(())
    }

    /// Every sample taken must have been consumed once the consumer is done.
    fn check_drained(&self, queue: &SampleQueue) -> common::Result<()> {
        let remaining = queue.len();
        if remaining > 0 {
            return Err(common::Error::UnconsumedSamples {
                locator: self.locator.to_string(),
                remaining,
            });
        }
        Ok(())
    }

    /// Check the endpoint every sample interval and record availability
    /// intervals into `recorder` until `cancel` fires or [`stop`](Self::stop)
    /// is called.
    pub async fn run_endpoint_monitoring(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        recorder: Arc<dyn Recorder>,
    ) -> common::Result<()> {
        let session = self.begin_session(cancel, recorder)?;
        self.await_session(session).await
    }

    /// Like [`run_endpoint_monitoring`](Self::run_endpoint_monitoring), but
    /// returns as soon as the producer and consumer are running. Errors at
    /// the end of the session are logged.
    pub fn start_endpoint_monitoring(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        recorder: Arc<dyn Recorder>,
    ) -> common::Result<()> {
        let session = self.begin_session(cancel, recorder)?;
        let sampler = self.clone();
        tokio::spawn(async move {
            match sampler.await_session(session).await {
                Err(e) if e.is_invariant_violation() => {
                    error!(locator = %sampler.locator, error = %e, "Endpoint monitoring lost samples")
                }
                Err(e) => warn!(locator = %sampler.locator, error = %e, "Endpoint monitoring failed"),
                Ok(()) => {}
            }
        });
        Ok(())
    }

    /// Stop producing samples and wait until the consumer has recorded every
    /// sample already taken.
    ///
    /// Fails with [`common::Error::UnconsumedSamples`] if samples were left
    /// in the queue once the consumer finished.
    pub async fn stop(&self) -> common::Result<()> {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(session) = session else {
            return Ok(());
        };
        session.cancel.cancel();

        loop {
            info!(locator = %self.locator, "Waiting for consumer to finish");
            tokio::select! {
                _ = session.consumption_finished.cancelled() => break,
                _ = tokio::time::sleep(STOP_WAIT_LOG_INTERVAL) => {}
            }
        }
        info!(locator = %self.locator, "Consumer finished");
        self.check_drained(&session.queue)
    }

    /// Create one sample per tick until cancelled.
    ///
    /// The start time is taken before the check runs: when a request hangs on
    /// a 30s DNS lookup, the outage began when the request was made, not
    /// when it gave up.
    async fn produce_samples(self: Arc<Self>, queue: Arc<SampleQueue>, cancel: CancellationToken) {
        let mut ticker = interval(self.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let completer = queue.push(SystemTime::now());
            let sampler = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let outcome = sampler.check_connection(&cancel).await;
                if let Some(err) = &outcome.error {
                    error!(
                        locator = %sampler.locator,
                        backend = sampler.disruption_backend_name(),
                        connection = %sampler.connection_type,
                        audit_id = %outcome.correlation_id,
                        error = %err,
                        "Disruption sample failed"
                    );
                }
                completer.complete(outcome);
            });
        }

        queue.close();
    }
}

#[cfg(test)]
mod tests {
    use super::Session;
    use crate::prober::BackendSamplerBuilder;
    use crate::recorder::MemoryRecorder;
    use crate::sample::SampleQueue;
    use crate::types::ConnectionType;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_double_start_fails() {
        let sampler = Arc::new(
            BackendSamplerBuilder::simple("http://127.0.0.1:1", "api", "/", ConnectionType::New)
                .timeout(Duration::from_millis(200))
                .sample_interval(Duration::from_millis(50))
                .build()
                .unwrap(),
        );
        let cancel = CancellationToken::new();
        let recorder = Arc::new(MemoryRecorder::new());

        sampler.start_endpoint_monitoring(&cancel, recorder.clone()).unwrap();
        assert!(sampler.is_running());

        let err = sampler
            .run_endpoint_monitoring(&cancel, recorder.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, common::Error::AlreadyRunning(_)));

        sampler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_not_running_returns() {
        let sampler = BackendSamplerBuilder::simple("http://127.0.0.1:1", "api", "/", ConnectionType::Reused)
            .build()
            .unwrap();
        sampler.stop().await.unwrap();
        assert!(!sampler.is_running());
    }

    #[tokio::test]
    async fn test_stop_reports_unconsumed_samples() {
        let sampler = BackendSamplerBuilder::simple("http://127.0.0.1:1", "api", "/", ConnectionType::New)
            .build()
            .unwrap();
        let session = Session {
            cancel: CancellationToken::new(),
            consumption_finished: CancellationToken::new(),
            queue: Arc::new(SampleQueue::new()),
        };
        let _completer = session.queue.push(SystemTime::now());
        session.consumption_finished.cancel();
        *sampler.session.lock().unwrap() = Some(session.clone());

        let err = sampler.stop().await.unwrap_err();
        assert!(matches!(err, common::Error::UnconsumedSamples { remaining: 1, .. }));
        assert!(err.is_invariant_violation());
        assert!(session.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_misconfigured_client_fails_start() {
        let sampler = Arc::new(
            BackendSamplerBuilder::simple("https://api", "api", "/", ConnectionType::New)
                .bearer_token_auth(Some("token".to_string()), None)
                .build()
                .unwrap(),
        );
        let err = sampler
            .run_endpoint_monitoring(&CancellationToken::new(), Arc::new(MemoryRecorder::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, common::Error::Config(_)));
        assert!(!sampler.is_running());
    }
}
