//! Aiven Controller
//!
//! One generic reconciliation engine drives every Aiven-backed kind:
//! - ProjectVpc: VPCs inside an Aiven project
//! - PostgreSql: managed PostgreSQL services (references ProjectVpc)
//! - Database: logical databases inside a service
//! - ServiceUser: users of a service
//!
//! Two secret controllers run alongside: one guards auth token secrets that
//! are still in use, the other retriggers objects whose connection info
//! source secret changed.

mod backoff;
mod client;
mod conditions;
mod config;
mod constants;
mod controller;
mod error;
mod error_policy;
mod events;
mod finalize;
mod handler;
mod handlers;
mod k8s;
mod metrics;
mod reconciler;
mod registry;
mod secret_gc;
mod secret_watch;
mod secrets;
mod server;
mod status;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // kube and reqwest both link rustls; pin the provider before either builds a client.
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Aiven Controller");

    let config = ControllerConfig::from_env();

    info!("Configuration:");
    info!("  Aiven API: {}", config.aiven_api_url);
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Default token: {}", if config.default_token.is_some() { "set" } else { "unset" });
    info!("  Poll interval: {:?}", config.poll_interval);
    info!("  Requeue timeout: {:?}", config.requeue_timeout);
    info!("  Max concurrent reconciles: {}", config.max_concurrent_reconciles);
    info!("  Metrics port: {}", config.metrics_port);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
