use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{EventKind, NotificationBus, Recipient};
use crate::dispatch::engine::DispatchEngine;
use crate::error::DispatchError;
use crate::models::driver::{Driver, DriverStatus, GeoPoint, VehicleClass};
use crate::repo::{BookingRepository, DriverRepository};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferResponse {
    Accept,
    Reject,
}

/// Owns driver-side state: availability, location and offer responses.
/// Admin listeners see every availability change, whatever caused it.
pub struct DriverCoordinator {
    drivers: Arc<dyn DriverRepository>,
    bookings: Arc<dyn BookingRepository>,
    engine: Arc<DispatchEngine>,
    bus: Arc<dyn NotificationBus>,
}

impl DriverCoordinator {
    pub fn new(
        drivers: Arc<dyn DriverRepository>,
        bookings: Arc<dyn BookingRepository>,
        engine: Arc<DispatchEngine>,
        bus: Arc<dyn NotificationBus>,
    ) -> Self {
        Self {
            drivers,
            bookings,
            engine,
            bus,
        }
    }

    pub async fn register_driver(
        &self,
        name: String,
        vehicle_class: VehicleClass,
        location: GeoPoint,
    ) -> Result<Driver, DispatchError> {
        let now = Utc::now();
        let driver = Driver {
            id: Uuid::new_v4(),
            name,
            vehicle_class,
            location,
            status: DriverStatus::Available,
            current_booking_id: None,
            offers_received: 0,
            accepted_count: 0,
            completed_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.drivers.create(driver.clone()).await?;
        info!(driver_id = %driver.id, "driver registered");
        Ok(driver)
    }

    pub async fn update_availability(
        &self,
        driver_id: Uuid,
        status: DriverStatus,
    ) -> Result<Driver, DispatchError> {
        let driver = self.drivers.update_status(driver_id, status).await?;

        if let Err(err) = self
            .bus
            .publish(
                Recipient::Admins,
                EventKind::DriverStatusUpdate,
                json!({ "driver_id": driver_id, "status": driver.status }),
            )
            .await
        {
            warn!(driver_id = %driver_id, error = %err, "failed to broadcast driver status");
        }

        Ok(driver)
    }

    /// Persist the new position and, while a trip is live, stream it to
    /// the requester. Looking up the active booking is best-effort.
    pub async fn update_location(
        &self,
        driver_id: Uuid,
        location: GeoPoint,
    ) -> Result<Driver, DispatchError> {
        let driver = self
            .drivers
            .update_location(driver_id, location.clone())
            .await?;

        match self.bookings.find_active_by_driver(driver_id).await {
            Ok(Some(booking)) => {
                if let Err(err) = self
                    .bus
                    .publish(
                        Recipient::Id(booking.requester_id),
                        EventKind::DriverLocation,
                        json!({
                            "booking_id": booking.id,
                            "latitude": location.lat,
                            "longitude": location.lng,
                        }),
                    )
                    .await
                {
                    warn!(driver_id = %driver_id, error = %err, "failed to push driver location");
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(driver_id = %driver_id, error = %err, "active booking lookup failed")
            }
        }

        Ok(driver)
    }

    pub async fn respond_to_offer(
        &self,
        driver_id: Uuid,
        booking_id: Uuid,
        response: OfferResponse,
    ) -> Result<(), DispatchError> {
        self.drivers.find(driver_id).await?;

        if let Err(err) = self.drivers.increment_offers(driver_id).await {
            warn!(driver_id = %driver_id, error = %err, "failed to increment offer count");
        }

        match response {
            OfferResponse::Accept => self
                .engine
                .driver_accepts(driver_id, booking_id)
                .await
                .map(|_| ()),
            OfferResponse::Reject => self.engine.driver_rejects(driver_id, booking_id).await,
        }
    }

    pub async fn driver(&self, driver_id: Uuid) -> Result<Driver, DispatchError> {
        self.drivers.find(driver_id).await
    }

    pub async fn all_drivers(&self) -> Result<Vec<Driver>, DispatchError> {
        self.drivers.all().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use uuid::Uuid;

    use super::{DriverCoordinator, OfferResponse};
    use crate::bus::registry::{ConnectionRegistry, Role};
    use crate::bus::{EventKind, NotificationBus};
    use crate::dispatch::engine::DispatchEngine;
    use crate::error::DispatchError;
    use crate::models::booking::BookingRequest;
    use crate::models::driver::{DriverStatus, GeoPoint, VehicleClass};
    use crate::observability::metrics::Metrics;
    use crate::pricing::{GreatCircleCalculator, PricingEngine, SurgeEstimator};
    use crate::repo::memory::{InMemoryBookings, InMemoryDrivers};

    fn coordinator() -> (
        Arc<DriverCoordinator>,
        Arc<DispatchEngine>,
        Arc<ConnectionRegistry>,
    ) {
        let bookings = Arc::new(InMemoryBookings::new());
        let drivers = Arc::new(InMemoryDrivers::new());
        let metrics = Metrics::new();
        let registry = Arc::new(ConnectionRegistry::new(
            64,
            Duration::from_millis(100),
            metrics.clone(),
        ));
        let bus = registry.clone() as Arc<dyn NotificationBus>;

        let pricing = PricingEngine::new(
            bookings.clone(),
            drivers.clone(),
            Arc::new(GreatCircleCalculator),
            SurgeEstimator::new(24..=24),
        );
        let engine = Arc::new(DispatchEngine::new(
            bookings.clone(),
            drivers.clone(),
            pricing,
            bus.clone(),
            5.0,
            metrics,
        ));

        (
            Arc::new(DriverCoordinator::new(
                drivers,
                bookings,
                engine.clone(),
                bus,
            )),
            engine,
            registry,
        )
    }

    #[tokio::test]
    async fn availability_changes_are_broadcast_to_admins() {
        let (coordinator, _engine, registry) = coordinator();

        let driver = coordinator
            .register_driver(
                "Nadia".to_string(),
                VehicleClass::Bike,
                GeoPoint { lat: 0.0, lng: 0.0 },
            )
            .await
            .unwrap();

        let admin = Uuid::new_v4();
        let mut admin_rx = registry.register(admin, Role::Admin).await;

        let updated = coordinator
            .update_availability(driver.id, DriverStatus::Offline)
            .await
            .unwrap();
        assert_eq!(updated.status, DriverStatus::Offline);

        let event = admin_rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::DriverStatusUpdate);
    }

    #[tokio::test]
    async fn location_updates_without_a_trip_stay_silent() {
        let (coordinator, _engine, registry) = coordinator();

        let driver = coordinator
            .register_driver(
                "Omar".to_string(),
                VehicleClass::Car,
                GeoPoint { lat: 0.0, lng: 0.0 },
            )
            .await
            .unwrap();

        let requester = Uuid::new_v4();
        let mut requester_rx = registry.register(requester, Role::User).await;

        coordinator
            .update_location(
                driver.id,
                GeoPoint {
                    lat: 0.01,
                    lng: 0.01,
                },
            )
            .await
            .unwrap();

        assert!(requester_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn location_updates_during_a_trip_reach_the_requester() {
        let (coordinator, engine, registry) = coordinator();

        let driver = coordinator
            .register_driver(
                "Priya".to_string(),
                VehicleClass::Car,
                GeoPoint {
                    lat: 0.001,
                    lng: 0.001,
                },
            )
            .await
            .unwrap();

        let requester = Uuid::new_v4();
        let mut requester_rx = registry.register(requester, Role::User).await;

        let booking = engine
            .create_booking(
                requester,
                BookingRequest {
                    pickup: GeoPoint { lat: 0.0, lng: 0.0 },
                    dropoff: GeoPoint {
                        lat: 0.0,
                        lng: 0.09,
                    },
                    vehicle_class: VehicleClass::Car,
                    scheduled_at: None,
                },
            )
            .await
            .unwrap();

        coordinator
            .respond_to_offer(driver.id, booking.id, OfferResponse::Accept)
            .await
            .unwrap();

        // Drain booking_accepted before the location event.
        let accepted = requester_rx.recv().await.unwrap();
        assert_eq!(accepted.kind, EventKind::BookingAccepted);

        coordinator
            .update_location(
                driver.id,
                GeoPoint {
                    lat: 0.002,
                    lng: 0.002,
                },
            )
            .await
            .unwrap();

        let event = requester_rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::DriverLocation);
        assert_eq!(event.payload["booking_id"], booking.id.to_string());
    }

    #[tokio::test]
    async fn responding_counts_the_offer_even_when_the_claim_loses() {
        let (coordinator, engine, _) = coordinator();

        let first = coordinator
            .register_driver(
                "Ana".to_string(),
                VehicleClass::Car,
                GeoPoint {
                    lat: 0.001,
                    lng: 0.001,
                },
            )
            .await
            .unwrap();
        let second = coordinator
            .register_driver(
                "Bo".to_string(),
                VehicleClass::Car,
                GeoPoint {
                    lat: 0.002,
                    lng: 0.002,
                },
            )
            .await
            .unwrap();

        let booking = engine
            .create_booking(
                Uuid::new_v4(),
                BookingRequest {
                    pickup: GeoPoint { lat: 0.0, lng: 0.0 },
                    dropoff: GeoPoint {
                        lat: 0.0,
                        lng: 0.09,
                    },
                    vehicle_class: VehicleClass::Car,
                    scheduled_at: None,
                },
            )
            .await
            .unwrap();

        coordinator
            .respond_to_offer(first.id, booking.id, OfferResponse::Accept)
            .await
            .unwrap();
        let err = coordinator
            .respond_to_offer(second.id, booking.id, OfferResponse::Accept)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::StateConflict(_)));

        let loser = coordinator.driver(second.id).await.unwrap();
        assert_eq!(loser.offers_received, 1);
        assert_eq!(loser.accepted_count, 0);
    }

    #[tokio::test]
    async fn unknown_driver_cannot_respond() {
        let (coordinator, _engine, _) = coordinator();
        let err = coordinator
            .respond_to_offer(Uuid::new_v4(), Uuid::new_v4(), OfferResponse::Accept)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)));
    }
}
