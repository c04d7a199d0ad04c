//! Relay HTTP server.
//!
//! Serves the relay message endpoint and forwards every other request to the
//! attendance backend, adding the bearer header to stream requests.

use std::sync::Arc;

use anyhow::Result;

use crate::api::{RelayAppState, create_relay_router};
use crate::config::RelayConfig;
use crate::relay::{Fetch, InterceptingFetcher, RelayRegistry, ReqwestFetcher};

/// Build the registry and router for `config`, with the first worker installed.
pub async fn create_relay(
    config: &RelayConfig,
    network: Arc<dyn Fetch>,
) -> (Arc<RelayRegistry>, axum::Router) {
    let registry = Arc::new(RelayRegistry::with_prefix(
        network.clone(),
        &config.protected_prefix,
    ));
    registry.register().await;

    let state = Arc::new(RelayAppState {
        registry: registry.clone(),
        network: InterceptingFetcher::new(registry.subscribe(), network),
        api_host: config.api_host.clone(),
        max_body_bytes: config.max_body_bytes,
    });
    (registry, create_relay_router(state))
}

/// Start the relay on `config.bind` and serve until Ctrl-C.
///
/// # Arguments
/// * `config` - Backend origin, bind address and protected prefix.
pub async fn start_relay_http(config: RelayConfig) -> Result<()> {
    let network: Arc<dyn Fetch> = Arc::new(ReqwestFetcher::new()?);
    let (registry, router) = create_relay(&config, network).await;

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(
        "Relay listening on http://{} (forwarding to {}, protecting {})",
        config.bind,
        config.api_host,
        config.protected_prefix
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    registry.unregister().await;
    tracing::info!("Relay stopped");

    Ok(())
}
