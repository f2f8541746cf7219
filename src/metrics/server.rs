//! Scrape endpoint.
//!
//!   GET /metrics  → Prometheus text exposition
//!   GET /healthz  → "ok"

use super::ApiMetrics;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub fn build_router(metrics: ApiMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_text))
        .route("/healthz", get(healthz))
        .with_state(metrics)
}

/// Bind `bind_addr` and serve until the process exits.
pub async fn serve(metrics: ApiMetrics, bind_addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    serve_listener(metrics, listener).await
}

pub async fn serve_listener(metrics: ApiMetrics, listener: TcpListener) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "metrics endpoint listening");
    axum::serve(listener, build_router(metrics)).await?;
    Ok(())
}

async fn metrics_text(State(metrics): State<ApiMetrics>) -> impl IntoResponse {
    match metrics.encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}
