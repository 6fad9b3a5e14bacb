//! End to end monitoring sessions against a local backend

mod support;

use disruption::{BackendSamplerBuilder, ConnectionType, IntervalLevel, MemoryRecorder, SamplerHook};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(50);

async fn host(healthy: Arc<AtomicBool>) -> String {
    let addr = support::spawn_server(support::switchable_backend(healthy)).await;
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_outage_recorded_between_recoveries() {
    let healthy = Arc::new(AtomicBool::new(true));
    let host = host(healthy.clone()).await;

    let started = Arc::new(AtomicUsize::new(0));
    let hook: Arc<dyn SamplerHook> = {
        let started = started.clone();
        Arc::new(move || {
            started.fetch_add(1, Ordering::SeqCst);
        })
    };

    let sampler = Arc::new(
        BackendSamplerBuilder::simple(host, "switchable", "/healthz", ConnectionType::New)
            .expected_body("ok")
            .timeout(Duration::from_secs(2))
            .sample_interval(TICK)
            .sampler_hook(hook)
            .build()
            .unwrap(),
    );
    let recorder = Arc::new(MemoryRecorder::new());
    let cancel = CancellationToken::new();

    sampler.start_endpoint_monitoring(&cancel, recorder.clone()).unwrap();
    tokio::time::sleep(TICK * 6).await;
    healthy.store(false, Ordering::SeqCst);
    tokio::time::sleep(TICK * 6).await;
    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(TICK * 6).await;
    sampler.stop().await.unwrap();

    let intervals = recorder.intervals();
    assert!(intervals.len() >= 3, "got {:?}", intervals);
    assert_eq!(intervals.first().map(|i| i.level), Some(IntervalLevel::Info));
    assert_eq!(intervals.last().map(|i| i.level), Some(IntervalLevel::Info));
    assert!(intervals.iter().any(|i| {
        i.level == IntervalLevel::Error && i.message.human_message.contains("503 Service Unavailable")
    }));
    assert!(started.load(Ordering::SeqCst) >= 1);

    for pair in intervals.windows(2) {
        assert!(pair[0].from <= pair[1].from);
        assert_eq!(pair[0].to, Some(pair[1].from));
    }
    assert!(intervals.iter().all(|i| i.is_closed()));
}

#[tokio::test]
async fn test_parent_cancellation_ends_run() {
    let healthy = Arc::new(AtomicBool::new(true));
    let host = host(healthy).await;

    let sampler = Arc::new(
        BackendSamplerBuilder::simple(host, "switchable", "/healthz", ConnectionType::Reused)
            .sample_interval(TICK)
            .build()
            .unwrap(),
    );
    let recorder = Arc::new(MemoryRecorder::new());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(TICK * 4).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        sampler.run_endpoint_monitoring(&cancel, recorder.clone()),
    )
    .await
    .expect("run should end after cancellation");
    assert!(result.is_ok());
    assert!(!sampler.is_running());

    let intervals = recorder.intervals();
    assert_eq!(intervals.len(), 1);
    assert_eq!(intervals[0].level, IntervalLevel::Info);
    assert!(intervals[0].is_closed());
}

#[tokio::test]
async fn test_restart_after_stop() {
    let healthy = Arc::new(AtomicBool::new(true));
    let host = host(healthy).await;

    let sampler = Arc::new(
        BackendSamplerBuilder::simple(host, "switchable", "/healthz", ConnectionType::New)
            .sample_interval(TICK)
            .build()
            .unwrap(),
    );
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let recorder = Arc::new(MemoryRecorder::new());
        sampler.start_endpoint_monitoring(&cancel, recorder.clone()).unwrap();
        tokio::time::sleep(TICK * 3).await;
        sampler.stop().await.unwrap();

        // The session is cleared by the task awaiting it.
        for _ in 0..50 {
            if !sampler.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!sampler.is_running());
        assert_eq!(recorder.len(), 1);
    }
}

#[tokio::test]
async fn test_unreachable_backend_records_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sampler = Arc::new(
        BackendSamplerBuilder::simple(format!("http://{}", addr), "gone", "/healthz", ConnectionType::New)
            .timeout(Duration::from_millis(500))
            .sample_interval(TICK)
            .build()
            .unwrap(),
    );
    let recorder = Arc::new(MemoryRecorder::new());
    sampler.start_endpoint_monitoring(&CancellationToken::new(), recorder.clone()).unwrap();
    tokio::time::sleep(TICK * 4).await;
    sampler.stop().await.unwrap();

    let intervals = recorder.intervals();
    assert!(!intervals.is_empty());
    assert_eq!(intervals[0].level, IntervalLevel::Error);
    assert!(intervals.iter().all(|i| i.level != IntervalLevel::Info));
}
