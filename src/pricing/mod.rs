pub mod distance;
pub mod surge;

use std::sync::Arc;

use chrono::{Local, Timelike};

use crate::error::DispatchError;
use crate::models::driver::{GeoPoint, VehicleClass};
use crate::repo::{BookingRepository, DriverRepository};

pub use distance::{DistanceCalculator, GreatCircleCalculator, RouteEstimate, RoutingCalculator};
pub use surge::SurgeEstimator;

/// Quotes a price for a trip: the per-class distance rate times the current
/// surge multiplier, rounded to cents. A booking's quote is computed once
/// at creation and never revised.
pub struct PricingEngine {
    bookings: Arc<dyn BookingRepository>,
    drivers: Arc<dyn DriverRepository>,
    calculator: Arc<dyn DistanceCalculator>,
    surge: SurgeEstimator,
}

impl PricingEngine {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        drivers: Arc<dyn DriverRepository>,
        calculator: Arc<dyn DistanceCalculator>,
        surge: SurgeEstimator,
    ) -> Self {
        Self {
            bookings,
            drivers,
            calculator,
            surge,
        }
    }

    pub async fn quote(
        &self,
        pickup: &GeoPoint,
        dropoff: &GeoPoint,
        class: &VehicleClass,
    ) -> Result<f64, DispatchError> {
        let route = self.calculator.estimate(pickup, dropoff).await?;
        let base = route.distance_km * class.rate_per_km();

        let active = self.bookings.active_count().await?;
        let available = self.drivers.available_count().await?;
        let multiplier = self
            .surge
            .multiplier(active, available, Local::now().hour());

        Ok(round_cents(base * multiplier))
    }
}

fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}
