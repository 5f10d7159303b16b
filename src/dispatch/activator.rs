use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::dispatch::engine::DispatchEngine;

/// Periodic promotion of future-dated bookings into the live dispatch
/// pipeline. Each tick sweeps every due booking independently; one failure
/// never blocks the rest.
pub async fn run_activator(engine: Arc<DispatchEngine>, interval: Duration) {
    info!("scheduled booking activator started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match engine.activate_scheduled().await {
            Ok(0) => {}
            Ok(count) => info!(count, "activated scheduled bookings"),
            Err(err) => error!(error = %err, "scheduled activation sweep failed"),
        }
    }
}
