//! # Probe Server
//!
//! Serves the operator's scrape and probe endpoints on `METRICS_PORT`:
//!
//! - `/metrics`: the reconcile, object-write, token-rotation and
//!   certificate-renewal counters in Prometheus text format
//! - `/healthz`: liveness, answered as long as the runtime is alive
//! - `/readyz`: 503 until the Kubernetes client is connected and the
//!   DynaKube controller has been started

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::observability::metrics::REGISTRY;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Default)]
pub struct ServerState {
    controller_started: AtomicBool,
}

impl ServerState {
    pub fn mark_ready(&self) {
        self.controller_started.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.controller_started.load(Ordering::Relaxed)
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

/// Binds `0.0.0.0:<port>` and serves until the process exits
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "probe server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    let mut body = Vec::new();
    match TextEncoder::new().encode(&REGISTRY.gather(), &mut body) {
        Ok(()) => (StatusCode::OK, [("content-type", PROMETHEUS_CONTENT_TYPE)], body),
        Err(err) => {
            error!(error = %err, "failed to encode operator metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("failed to encode metrics: {err}").into_bytes(),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "waiting for the DynaKube controller")
    }
}
