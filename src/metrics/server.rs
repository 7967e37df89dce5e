//! Prometheus scrape endpoint.

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use super::encode_metrics;

pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(prometheus_metrics))
}

/// GET /metrics - Prometheus metrics endpoint
async fn prometheus_metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Serve `/metrics` on `listener` until shutdown is broadcast.
pub async fn serve_metrics(
    listener: TcpListener,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Metrics endpoint listening");
    }

    axum::serve(listener, metrics_router())
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
}
