use std::sync::Arc;

use crate::bus::registry::ConnectionRegistry;
use crate::bus::NotificationBus;
use crate::config::Config;
use crate::dispatch::coordinator::DriverCoordinator;
use crate::dispatch::engine::DispatchEngine;
use crate::observability::metrics::Metrics;
use crate::pricing::{DistanceCalculator, PricingEngine, SurgeEstimator};
use crate::repo::memory::{InMemoryBookings, InMemoryDrivers};
use crate::repo::{BookingRepository, DriverRepository};

pub struct AppState {
    pub bookings: Arc<dyn BookingRepository>,
    pub drivers: Arc<dyn DriverRepository>,
    pub registry: Arc<ConnectionRegistry>,
    pub engine: Arc<DispatchEngine>,
    pub coordinator: Arc<DriverCoordinator>,
    pub metrics: Metrics,
}

impl AppState {
    /// Wire the dispatch stack around the chosen bus and distance
    /// backends. The registry exists either way so connections can attach
    /// even while publishes go through the external relay.
    pub fn new(
        config: &Config,
        registry: Arc<ConnectionRegistry>,
        bus: Arc<dyn NotificationBus>,
        calculator: Arc<dyn DistanceCalculator>,
        metrics: Metrics,
    ) -> Self {
        let bookings: Arc<dyn BookingRepository> = Arc::new(InMemoryBookings::new());
        let drivers: Arc<dyn DriverRepository> = Arc::new(InMemoryDrivers::new());

        let surge = SurgeEstimator::new(config.peak_start_hour..=config.peak_end_hour);
        let pricing = PricingEngine::new(bookings.clone(), drivers.clone(), calculator, surge);

        let engine = Arc::new(DispatchEngine::new(
            bookings.clone(),
            drivers.clone(),
            pricing,
            bus.clone(),
            config.search_radius_km,
            metrics.clone(),
        ));
        let coordinator = Arc::new(DriverCoordinator::new(
            drivers.clone(),
            bookings.clone(),
            engine.clone(),
            bus,
        ));

        Self {
            bookings,
            drivers,
            registry,
            engine,
            coordinator,
            metrics,
        }
    }
}
