//! GraphQL federation gateway runtime: C5 query executor, C6 service
//! registry, C7 plugin pipeline, C8 wire adapters, configuration and
//! logging. Built on top of the pure `federation` crate (C1-C4).
//!
//! Kept as a library separate from `src/main.rs` so integration tests
//! (`tests/`) can drive the registry/executor/wire stack directly
//! against in-process fake backing services instead of going through a
//! spawned process.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod plugin;
pub mod registry;
pub mod wire;

use crate::config::{Cli, GatewayConfig};
use crate::plugin::{HeadersPlugin, Plugin, PluginPipeline};
use crate::registry::ServiceRegistry;
use crate::wire::inbound::{private_router, public_router, AppState};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Builds the configured plugin chain (spec.md §4.7: plugins run "in
/// registration order"). Only the `headers` plugin ships with this
/// gateway (SPEC_FULL.md §11); unknown plugin names in the config are
/// ignored rather than rejected, so operators can stage config ahead of
/// a binary upgrade.
pub async fn build_plugins(config: &GatewayConfig) -> anyhow::Result<Vec<Arc<dyn Plugin>>> {
    let mut plugins: Vec<Arc<dyn Plugin>> = Vec::new();
    let headers_config = config.plugin_config("headers");
    if !headers_config.is_null() {
        let plugin = HeadersPlugin::new(headers_config)
            .await
            .map_err(|error| anyhow::anyhow!("failed to configure `headers` plugin: {error}"))?;
        plugins.push(Arc::new(plugin));
    }
    Ok(plugins)
}

/// `:8080` style addresses (spec.md §6 `ADDR` default) bind on every
/// interface; anything else is passed through unchanged.
pub fn normalize_addr(addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    }
}

pub fn init_tracing(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}

async fn shutdown_signal(poll_shutdown_tx: watch::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining in-flight requests");
    let _ = poll_shutdown_tx.send(());
}

/// Wires configuration, the registry's background polling, the plugin
/// pipeline and the public/private HTTP routers together, then serves
/// until a shutdown signal arrives (spec.md §6, SPEC_FULL.md §10-11).
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = GatewayConfig::load(&cli)?;
    init_tracing(&cli.log);

    tracing::info!(
        addr = %config.addr,
        services = config.services.len(),
        "starting gateway"
    );

    let http = wire::outbound::build_client(config.max_response_time);
    let registry = ServiceRegistry::new(config.services.clone(), http.clone());

    let plugins = build_plugins(&config).await?;
    let plugins = Arc::new(PluginPipeline::new(plugins));

    let (poll_shutdown_tx, poll_shutdown_rx) = watch::channel(());
    registry.spawn_polling(config.poll_interval, poll_shutdown_rx);

    // Per-operation cancellation on client disconnect (spec.md §5, §4.5) is
    // wired per-request in `wire::inbound::run_operation`, not here — each
    // inbound request gets its own cancel channel tied to the lifetime of
    // its handler future, rather than sharing one gateway-wide signal.
    // Graceful process shutdown is a separate mechanism: axum's own
    // `with_graceful_shutdown` below already stops accepting new
    // connections and waits for in-flight handlers to finish.
    let state = AppState {
        registry: Arc::clone(&registry),
        plugins: Arc::clone(&plugins),
        http: http.clone(),
        max_requests_per_operation: config.max_requests_per_operation,
        max_request_bytes: config.max_request_bytes,
        max_response_time: config.max_response_time,
    };

    let app = public_router(state.clone())
        .merge(private_router(state))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = normalize_addr(&config.addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(poll_shutdown_tx))
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_colon_prefixed_addr_to_all_interfaces() {
        assert_eq!(normalize_addr(":8080"), "0.0.0.0:8080");
    }

    #[test]
    fn leaves_explicit_host_addr_unchanged() {
        assert_eq!(normalize_addr("127.0.0.1:9000"), "127.0.0.1:9000");
    }
}
