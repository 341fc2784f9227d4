//! Process entrypoint: loads configuration, builds [`AppState`], and serves
//! the HTTP surface defined in [`neuron_gateway::routes`] (§6, §9).
//!
//! Config loading from a path/file-watching is explicitly out of scope
//! (`neuron_gateway::config`'s own doc comment) — this binary reads a
//! single JSON document from the path named by `NEURON_GATEWAY_CONFIG`,
//! defaulting to `./neuron-gateway.json`.

use std::net::SocketAddr;

use axum::middleware;
use neuron_gateway::{auth, routes, AppState, GatewayConfig};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    neuron_gateway::telemetry::init();

    let config = load_config()?;
    let loopback_only = config.loopback_only();
    let host = if loopback_only { "127.0.0.1".to_string() } else { config.host.clone() };
    let port = config.port;

    let state = AppState::build(config).await?;

    let app = routes::router(state.clone())
        .layer(middleware::from_fn_with_state(state, auth::require_api_key))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(%addr, loopback_only, "neuron-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Reads and parses the config document named by `NEURON_GATEWAY_CONFIG`
/// (default `./neuron-gateway.json`).
fn load_config() -> Result<GatewayConfig, Box<dyn std::error::Error>> {
    let path = std::env::var("NEURON_GATEWAY_CONFIG").unwrap_or_else(|_| "neuron-gateway.json".to_string());
    let raw = std::fs::read_to_string(&path).map_err(|e| format!("reading config at {path}: {e}"))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    Ok(GatewayConfig::from_value(value)?)
}
