//! # HTTP Server
//!
//! Metrics and health endpoints:
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness (always 200)
//! - `/readyz` - Readiness (200 once every watcher has finished its initial sync)

use crate::metrics::Metrics;
use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Shared state of the HTTP server.
#[derive(Debug)]
pub struct ServerState {
    /// Flipped once every watcher has synced
    pub is_ready: AtomicBool,
    /// Metrics to expose
    pub metrics: Arc<Metrics>,
}

/// Router with every endpoint.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

/// Serve on `0.0.0.0:port` until the process exits.
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Wait for every watcher's start signal, then report ready. A watcher that
/// exits before syncing drops its sender and readiness stays off.
pub async fn mark_ready(state: Arc<ServerState>, started: Vec<oneshot::Receiver<()>>) {
    let watchers = started.len();
    let synced = futures::future::join_all(started)
        .await
        .into_iter()
        .filter(Result::is_ok)
        .count();
    if synced == watchers {
        info!("All {} watchers synced, reporting ready", watchers);
        state.is_ready.store(true, Ordering::Relaxed);
    } else {
        warn!("{} of {} watchers exited before syncing, staying unready", watchers - synced, watchers);
    }
}

async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.metrics.registry().gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> Arc<ServerState> {
        Arc::new(ServerState {
            is_ready: AtomicBool::new(false),
            metrics: Arc::new(Metrics::new().unwrap()),
        })
    }

    async fn status_of(state: &Arc<ServerState>, path: &str) -> StatusCode {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        router(Arc::clone(state)).oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_unready_until_watchers_sync() {
        let state = state();
        assert_eq!(status_of(&state, "/readyz").await, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(&state, "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_once_every_watcher_synced() {
        let state = state();
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        let marking = tokio::spawn(mark_ready(Arc::clone(&state), vec![first_rx, second_rx]));

        first_tx.send(()).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(status_of(&state, "/readyz").await, StatusCode::SERVICE_UNAVAILABLE);

        second_tx.send(()).unwrap();
        marking.await.unwrap();
        assert_eq!(status_of(&state, "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_watcher_exiting_before_sync_keeps_unready() {
        let state = state();
        let (synced_tx, synced_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = oneshot::channel::<()>();
        synced_tx.send(()).unwrap();
        drop(exited_tx);

        mark_ready(Arc::clone(&state), vec![synced_rx, exited_rx]).await;
        assert!(!state.is_ready.load(Ordering::Relaxed));
        assert_eq!(status_of(&state, "/readyz").await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_text() {
        let state = state();
        assert_eq!(status_of(&state, "/metrics").await, StatusCode::OK);
    }
}
