//! Integration tests for single checks against a live HTTP server

mod support;

use disruption::{BackendSamplerBuilder, ConnectionType, ProbeError, TlsConfig};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn host() -> String {
    let addr = support::spawn_server(support::backend()).await;
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_expected_body_matches() {
    let host = host().await;

    for connection_type in [ConnectionType::New, ConnectionType::Reused] {
        let sampler = BackendSamplerBuilder::simple(host.clone(), "backend", "/200", connection_type)
            .expected_body("200")
            .build()
            .unwrap();
        let outcome = sampler.check_connection(&CancellationToken::new()).await;
        assert_eq!(outcome.error, None, "{} connections", connection_type);
        assert!(!outcome.cancelled);
    }
}

#[tokio::test]
async fn test_unexpected_body_fails() {
    let host = host().await;
    let sampler = BackendSamplerBuilder::simple(host, "backend", "/200", ConnectionType::New)
        .expected_body("other")
        .build()
        .unwrap();

    let outcome = sampler.check_connection(&CancellationToken::new()).await;
    assert_eq!(outcome.error, Some(ProbeError::BodyMismatch("200".to_string())));
}

#[tokio::test]
async fn test_cancel_immediately_on_slow_endpoint() {
    let host = host().await;
    let sampler = BackendSamplerBuilder::simple(host, "backend", "/slow", ConnectionType::New)
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let check = sampler.check_connection(&cancel);
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), check)
        .await
        .expect("cancelled check should return promptly");
    assert_eq!(outcome.error, None);
    assert!(outcome.cancelled);
}

#[tokio::test]
async fn test_cancel_mid_flight() {
    let host = host().await;
    let sampler = BackendSamplerBuilder::simple(host, "backend", "/slow", ConnectionType::Reused)
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let outcome = sampler.check_connection(&cancel).await;
    assert_eq!(outcome.error, None);
    assert!(outcome.cancelled);
}

#[tokio::test]
async fn test_server_error_status_fails() {
    let host = host().await;
    let sampler = BackendSamplerBuilder::simple(host, "backend", "/unavailable", ConnectionType::New)
        .build()
        .unwrap();

    let outcome = sampler.check_connection(&CancellationToken::new()).await;
    let err = outcome.error.expect("503 should fail");
    assert_eq!(
        err.to_string(),
        "error running request: 503 Service Unavailable: try later"
    );
}

#[tokio::test]
async fn test_expected_status_accepts_not_found() {
    let host = host().await;
    let sampler = BackendSamplerBuilder::simple(host, "backend", "/not-found", ConnectionType::New)
        .expected_status_code(404)
        .build()
        .unwrap();

    let outcome = sampler.check_connection(&CancellationToken::new()).await;
    assert_eq!(outcome.error, None);
}

#[tokio::test]
async fn test_redirect_passes_without_body_expectation() {
    let host = host().await;
    let sampler = BackendSamplerBuilder::simple(host, "backend", "/redirect", ConnectionType::New)
        .build()
        .unwrap();

    let outcome = sampler.check_connection(&CancellationToken::new()).await;
    assert_eq!(outcome.error, None);
}

#[tokio::test]
async fn test_correlation_id_sent_as_header() {
    let host = host().await;
    let sampler = BackendSamplerBuilder::simple(host, "backend", "/audit", ConnectionType::New)
        .expected_body_regex(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .build()
        .unwrap();

    let first = sampler.check_connection(&CancellationToken::new()).await;
    let second = sampler.check_connection(&CancellationToken::new()).await;
    assert_eq!(first.error, None);
    assert_eq!(second.error, None);
    assert_ne!(first.correlation_id, second.correlation_id);
}

#[tokio::test]
async fn test_bearer_token_sent() {
    let host = host().await;
    let tls = TlsConfig {
        insecure_skip_verify: true,
        ..Default::default()
    };

    let authorized = BackendSamplerBuilder::simple(host.clone(), "backend", "/auth", ConnectionType::Reused)
        .bearer_token_auth(Some("secret".to_string()), None)
        .tls_config(tls.clone())
        .build()
        .unwrap();
    assert_eq!(authorized.check_connection(&CancellationToken::new()).await.error, None);

    let anonymous = BackendSamplerBuilder::simple(host, "backend", "/auth", ConnectionType::Reused)
        .tls_config(tls)
        .build()
        .unwrap();
    assert!(anonymous.check_connection(&CancellationToken::new()).await.error.is_some());
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind then drop to find a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sampler = BackendSamplerBuilder::simple(format!("http://{}", addr), "backend", "/", ConnectionType::New)
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let outcome = sampler.check_connection(&CancellationToken::new()).await;
    assert!(matches!(outcome.error, Some(ProbeError::Transport(_))));
}

#[tokio::test]
async fn test_host_name_resolved_before_connecting() {
    let addr = support::spawn_server(support::backend()).await;
    let sampler = BackendSamplerBuilder::simple(
        format!("http://localhost:{}", addr.port()),
        "backend",
        "/200",
        ConnectionType::New,
    )
    .timeout(Duration::from_secs(5))
    .build()
    .unwrap();

    let outcome = sampler.check_connection(&CancellationToken::new()).await;
    assert_eq!(outcome.error, None);
}

#[tokio::test]
async fn test_stalled_response_fails_before_request_timeout() {
    let host = host().await;
    let sampler = BackendSamplerBuilder::simple(host, "backend", "/slow", ConnectionType::New)
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    let outcome = sampler.check_connection(&CancellationToken::new()).await;
    assert!(matches!(outcome.error, Some(ProbeError::Transport(_))));
    // Reads give up at 4/5 of the request timeout.
    assert!(started.elapsed() < Duration::from_millis(1900), "took {:?}", started.elapsed());
}
