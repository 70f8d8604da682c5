//! HTTP surface
//!
//! - `GET /metrics` renders the current peering gauges for Prometheus
//! - `GET /health` answers "OK" as long as the process serves requests,
//!   whatever the state of the poll loop

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::ExporterError;
use crate::metrics::PeeringMetrics;

pub const LISTEN_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
    8080,
);

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<PeeringMetrics>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

// GET /health
async fn health() -> &'static str {
    "OK"
}

// GET /metrics
async fn get_metrics(State(app): State<AppState>) -> Response {
    match app.metrics.export() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("failed to encode metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    app_state: AppState,
    shutdown: CancellationToken,
) -> Result<(), ExporterError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Starting HTTP server on http://{addr}");
    }
    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
