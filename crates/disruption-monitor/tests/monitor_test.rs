//! Integration tests for a full monitoring run

use axum::{Router, http::StatusCode, routing::get};
use disruption_monitor::{Config, DisruptionMonitor, MetricsRegistry};
use prometheus_client::encoding::text::encode;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn spawn_backend() -> SocketAddr {
    let app = Router::new()
        .route("/healthy", get(|| async { "ok" }))
        .route("/broken", get(|| async { (StatusCode::BAD_GATEWAY, "no upstream") }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config(addr: SocketAddr) -> Config {
    let yaml = format!(
        r#"
sampler:
  interval: 50ms

backends:
  - name: healthy
    url: http://{addr}
    path: /healthy
    expected_body: ok
  - name: broken
    url: http://{addr}
    path: /broken
    connection_types: [reused]
"#
    );
    Config::from_yaml(&yaml).unwrap()
}

async fn run_for(monitor: &DisruptionMonitor, duration: Duration) -> disruption_monitor::Report {
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        trigger.cancel();
    });
    tokio::time::timeout(Duration::from_secs(10), monitor.run(&shutdown))
        .await
        .expect("monitor should stop after shutdown")
        .unwrap()
}

#[tokio::test]
async fn test_monitor_reports_per_backend() {
    let addr = spawn_backend().await;
    let monitor = DisruptionMonitor::from_config(&config(addr), None).unwrap();
    assert_eq!(monitor.samplers().len(), 3);

    let report = run_for(&monitor, Duration::from_millis(400)).await;

    assert_eq!(report.backends.len(), 3);
    for summary in report.backends.iter().filter(|b| b.backend == "healthy") {
        assert_eq!(summary.disruptions, 0);
        assert_eq!(summary.disruption_seconds, 0.0);
    }

    let broken = report.backend("broken").unwrap();
    assert_eq!(broken.connection, "reused");
    assert_eq!(broken.disruptions, 1);
    assert!(broken.disruption_seconds > 0.0);

    assert!(report.intervals.iter().all(|i| i.is_closed()));

    // Sessions are released just after the consumers finish.
    for _ in 0..50 {
        if monitor.samplers().iter().all(|s| !s.is_running()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("samplers still running after shutdown");
}

#[tokio::test]
async fn test_monitor_records_metrics() {
    let addr = spawn_backend().await;
    let metrics = Arc::new(MetricsRegistry::new());
    let monitor = DisruptionMonitor::from_config(&config(addr), Some(metrics.clone())).unwrap();

    run_for(&monitor, Duration::from_millis(300)).await;

    let mut text = String::new();
    encode(&mut text, &metrics.registry).unwrap();
    assert!(text.contains(r#"disruption_started_total{backend="broken",connection="reused"} 1"#));
    assert!(text.contains(r#"disruption_intervals_started_total{backend="healthy",connection="new",level="info"} 1"#));
    assert!(text.contains("disruption_samplers_active 0"));
}

#[tokio::test]
async fn test_empty_config_reports_nothing() {
    let monitor = DisruptionMonitor::from_config(&Config::default(), None).unwrap();
    let report = run_for(&monitor, Duration::from_millis(10)).await;
    assert!(report.backends.is_empty());
    assert!(report.intervals.is_empty());
}

#[tokio::test]
async fn test_invalid_regex_fails_build() {
    let yaml = r#"
backends:
  - name: web
    url: http://127.0.0.1:1
    path: /
    expected_body_regex: "(unclosed"
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert!(DisruptionMonitor::from_config(&config, None).is_err());
}
