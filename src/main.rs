use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use fleet_dispatch::api;
use fleet_dispatch::bus::registry::ConnectionRegistry;
use fleet_dispatch::bus::relay::RelayBus;
use fleet_dispatch::bus::NotificationBus;
use fleet_dispatch::config::Config;
use fleet_dispatch::dispatch::activator::run_activator;
use fleet_dispatch::error::DispatchError;
use fleet_dispatch::observability::metrics::Metrics;
use fleet_dispatch::pricing::{DistanceCalculator, GreatCircleCalculator, RoutingCalculator};
use fleet_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<(), DispatchError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let metrics = Metrics::new();
    let registry = Arc::new(ConnectionRegistry::new(
        config.connection_buffer,
        Duration::from_millis(config.send_timeout_ms),
        metrics.clone(),
    ));

    let bus: Arc<dyn NotificationBus> = match config.bus_backend.as_str() {
        "relay" => {
            tracing::info!(url = %config.relay_url, "publishing through external relay");
            Arc::new(RelayBus::connect(&config.relay_url).await?)
        }
        _ => registry.clone(),
    };

    let calculator: Arc<dyn DistanceCalculator> = match config.distance_backend.as_str() {
        "routing" => {
            tracing::info!(url = %config.routing_url, "using external routing service");
            Arc::new(RoutingCalculator::new(&config.routing_url)?)
        }
        _ => Arc::new(GreatCircleCalculator),
    };

    let state = Arc::new(AppState::new(&config, registry, bus, calculator, metrics));

    tokio::spawn(run_activator(
        state.engine.clone(),
        Duration::from_secs(config.activator_interval_secs),
    ));

    let app = api::rest::router(state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| DispatchError::Dependency(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| DispatchError::Dependency(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
