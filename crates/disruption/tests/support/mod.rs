//! Shared fixtures for integration tests.

use axum::{
    Router,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

/// Serve `app` on an ephemeral local port.
pub async fn spawn_server(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A backend with a handful of well known endpoints.
#[allow(dead_code)]
pub fn backend() -> Router {
    Router::new()
        .route("/200", get(|| async { "200" }))
        .route("/slow", get(slow))
        .route("/unavailable", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "try later") }))
        .route("/not-found", get(|| async { (StatusCode::NOT_FOUND, "missing") }))
        .route("/redirect", get(redirect))
        .route("/audit", get(echo_audit_id))
        .route("/auth", get(require_bearer))
}

/// A backend whose `/healthz` answers 200 or 503 depending on a switch.
#[allow(dead_code)]
pub fn switchable_backend(healthy: Arc<AtomicBool>) -> Router {
    Router::new().route(
        "/healthz",
        get(move || {
            let healthy = healthy.clone();
            async move {
                if healthy.load(Ordering::SeqCst) {
                    (StatusCode::OK, "ok")
                } else {
                    (StatusCode::SERVICE_UNAVAILABLE, "down")
                }
            }
        }),
    )
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "finally"
}

async fn redirect() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, "/200")])
}

async fn echo_audit_id(headers: HeaderMap) -> String {
    headers
        .get("audit-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn require_bearer(headers: HeaderMap) -> impl IntoResponse {
    match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some("Bearer secret") => (StatusCode::OK, "welcome"),
        _ => (StatusCode::UNAUTHORIZED, "who are you"),
    }
}
