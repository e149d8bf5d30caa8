//! # DynaKube Operator
//!
//! Entry point: sets up logging, the metrics and probe server, and the
//! DynaKube controller. Configuration comes from environment variables,
//! see [`dynakube_operator::config::ControllerConfig`].

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use kube::Client;
use tracing::{error, info};

use dynakube_operator::config::ControllerConfig;
use dynakube_operator::constants::OPERATOR_VERSION;
use dynakube_operator::controller;
use dynakube_operator::observability::metrics;
use dynakube_operator::server::{start_server, ServerState};

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dynakube_operator=info".into()),
        )
        .init();

    info!(
        version = OPERATOR_VERSION,
        git_hash = env!("BUILD_GIT_HASH"),
        built = env!("BUILD_DATETIME"),
        "starting DynaKube operator"
    );

    let config = ControllerConfig::from_env();
    info!(?config, "loaded configuration");

    metrics::register_metrics().context("failed to register metrics")?;

    let server_state = Arc::new(ServerState::default());
    if config.enable_metrics {
        let state = Arc::clone(&server_state);
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state).await {
                error!("HTTP server error: {}", e);
            }
        });
    }

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    server_state.mark_ready();
    controller::run(client, config).await;

    info!("operator stopped");
    Ok(())
}
