//! HTTP server for Prometheus metrics
//!
//! Runs a lightweight HTTP server on a separate port for Prometheus
//! scraping.
//!
//! # Endpoints
//!
//! - `GET /metrics` - Prometheus metrics
//! - `GET /health` - JSON summary of stream sessions
//!
//! # Example
//!
//! ```ignore
//! use livemetrics_client::metrics_server::MetricsServer;
//!
//! let metrics_handle = MetricsServer::start(9090);
//! ```

use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Metrics HTTP server
pub struct MetricsServer;

impl MetricsServer {
    /// Start the metrics server on the given port
    ///
    /// Returns a JoinHandle that can be used to abort the server.
    pub fn start(port: u16) -> JoinHandle<()> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        tokio::spawn(async move {
            info!(port = port, "Metrics server starting");

            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    error!(error = %e, port = port, "Failed to bind metrics server");
                    return;
                }
            };

            if let Err(e) = axum::serve(listener, router()).await {
                error!(error = %e, "Metrics server error");
            }
        })
    }
}

fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
}

/// Handler for /metrics endpoint
async fn metrics_handler() -> impl IntoResponse {
    let body = crate::metrics::gather();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[derive(serde::Serialize)]
struct HealthSummary {
    status: &'static str,
    active_sessions: f64,
    records_total: f64,
    reconnects_total: f64,
}

/// Handler for /health endpoint
async fn health_handler() -> impl IntoResponse {
    let Some(metrics) = crate::metrics::Metrics::get() else {
        return (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response();
    };

    let active_sessions = metrics.active_sessions.get();
    let summary = HealthSummary {
        status: if active_sessions > 0.0 { "streaming" } else { "idle" },
        active_sessions,
        records_total: metrics.records_total.get(),
        reconnects_total: metrics.reconnects_total.get(),
    };

    (StatusCode::OK, Json(summary)).into_response()
}
