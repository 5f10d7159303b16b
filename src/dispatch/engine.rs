use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{EventKind, NotificationBus, Recipient};
use crate::error::DispatchError;
use crate::models::booking::{
    Booking, BookingRequest, BookingStatus, OfferState, PriceEstimateRequest,
};
use crate::models::driver::DriverStatus;
use crate::observability::metrics::Metrics;
use crate::pricing::PricingEngine;
use crate::repo::{BookingRepository, DriverRepository};

/// Owns the booking lifecycle: quoting, the broadcast-and-claim offer
/// protocol, status transitions and scheduled activation.
pub struct DispatchEngine {
    bookings: Arc<dyn BookingRepository>,
    drivers: Arc<dyn DriverRepository>,
    pricing: PricingEngine,
    bus: Arc<dyn NotificationBus>,
    search_radius_km: f64,
    metrics: Metrics,
}

impl DispatchEngine {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        drivers: Arc<dyn DriverRepository>,
        pricing: PricingEngine,
        bus: Arc<dyn NotificationBus>,
        search_radius_km: f64,
        metrics: Metrics,
    ) -> Self {
        Self {
            bookings,
            drivers,
            pricing,
            bus,
            search_radius_km,
            metrics,
        }
    }

    /// Quote, persist and, unless the booking is scheduled for later, offer
    /// it to nearby drivers straight away. A booking that finds no drivers
    /// stays pending and the caller learns about it.
    pub async fn create_booking(
        &self,
        requester_id: Uuid,
        request: BookingRequest,
    ) -> Result<Booking, DispatchError> {
        let price = match self
            .pricing
            .quote(&request.pickup, &request.dropoff, &request.vehicle_class)
            .await
        {
            Ok(price) => price,
            Err(err) => {
                self.metrics
                    .bookings_total
                    .with_label_values(&["pricing_failed"])
                    .inc();
                return Err(err);
            }
        };

        let booking = Booking {
            id: Uuid::new_v4(),
            requester_id,
            driver_id: None,
            pickup: request.pickup,
            dropoff: request.dropoff,
            vehicle_class: request.vehicle_class,
            price,
            status: BookingStatus::Pending,
            driver_response: OfferState::Pending,
            rejected_drivers: Vec::new(),
            scheduled_at: request.scheduled_at,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        self.bookings.create(booking.clone()).await?;

        if booking.scheduled_at.is_none() {
            if let Err(err) = self.assign_booking_to_drivers(&booking).await {
                let outcome = match err {
                    DispatchError::NoAvailableDrivers => "no_drivers",
                    _ => "error",
                };
                self.metrics
                    .bookings_total
                    .with_label_values(&[outcome])
                    .inc();
                return Err(err);
            }
        }

        self.metrics
            .bookings_total
            .with_label_values(&["created"])
            .inc();
        info!(booking_id = %booking.id, price = booking.price, "booking created");
        Ok(booking)
    }

    pub async fn price_estimate(
        &self,
        request: &PriceEstimateRequest,
    ) -> Result<f64, DispatchError> {
        self.pricing
            .quote(&request.pickup, &request.dropoff, &request.vehicle_class)
            .await
    }

    /// Broadcast the offer to every eligible driver. Drivers that already
    /// rejected this booking are not eligible again; a failed publish to
    /// one candidate never aborts the broadcast.
    pub async fn assign_booking_to_drivers(&self, booking: &Booking) -> Result<(), DispatchError> {
        let candidates = self
            .drivers
            .find_available(
                &booking.pickup,
                &booking.vehicle_class,
                self.search_radius_km,
                &booking.rejected_drivers,
            )
            .await?;

        if candidates.is_empty() {
            warn!(booking_id = %booking.id, "no available drivers for broadcast");
            return Err(DispatchError::NoAvailableDrivers);
        }

        let payload = serde_json::to_value(booking)
            .map_err(|err| DispatchError::Dependency(format!("booking encode failed: {err}")))?;

        for driver in candidates {
            info!(booking_id = %booking.id, driver_id = %driver.id, "offering booking to driver");
            if let Err(err) = self
                .bus
                .publish(
                    Recipient::Id(driver.id),
                    EventKind::NewBookingRequest,
                    payload.clone(),
                )
                .await
            {
                warn!(driver_id = %driver.id, error = %err, "failed to notify driver, skipping");
                continue;
            }
            self.metrics.offers_sent_total.inc();
        }

        Ok(())
    }

    /// First valid acceptance wins the offer; everyone else gets a
    /// `StateConflict` and should treat it as "someone got there first".
    pub async fn driver_accepts(
        &self,
        driver_id: Uuid,
        booking_id: Uuid,
    ) -> Result<Booking, DispatchError> {
        let booking = match self.bookings.claim(booking_id, driver_id).await {
            Ok(booking) => booking,
            Err(err) => {
                if matches!(err, DispatchError::StateConflict(_)) {
                    self.metrics
                        .claims_total
                        .with_label_values(&["conflict"])
                        .inc();
                }
                return Err(err);
            }
        };
        self.metrics
            .claims_total
            .with_label_values(&["accepted"])
            .inc();

        self.drivers.assign_booking(driver_id, booking_id).await?;
        if let Err(err) = self.drivers.increment_accepted(driver_id).await {
            warn!(driver_id = %driver_id, error = %err, "failed to increment accepted count");
        }

        self.broadcast_driver_status(driver_id, DriverStatus::Busy)
            .await;

        if let Err(err) = self
            .bus
            .publish(
                Recipient::Id(booking.requester_id),
                EventKind::BookingAccepted,
                json!({ "booking_id": booking.id, "driver_id": driver_id }),
            )
            .await
        {
            warn!(booking_id = %booking.id, error = %err, "failed to notify requester of acceptance");
        }

        info!(booking_id = %booking.id, driver_id = %driver_id, "booking claimed");
        Ok(booking)
    }

    /// Resolve the current offer cycle as rejected, then start a fresh one
    /// against the refreshed candidate pool minus every driver that has
    /// rejected this booking so far.
    pub async fn driver_rejects(
        &self,
        driver_id: Uuid,
        booking_id: Uuid,
    ) -> Result<(), DispatchError> {
        if let Err(err) = self.bookings.reject_offer(booking_id, driver_id).await {
            if matches!(err, DispatchError::StateConflict(_)) {
                self.metrics
                    .claims_total
                    .with_label_values(&["conflict"])
                    .inc();
            }
            return Err(err);
        }
        self.metrics
            .claims_total
            .with_label_values(&["rejected"])
            .inc();
        info!(booking_id = %booking_id, driver_id = %driver_id, "driver rejected offer");

        let booking = self.bookings.reopen_offer(booking_id).await?;
        self.assign_booking_to_drivers(&booking).await
    }

    /// Advance the lifecycle by one step on behalf of the bound driver.
    /// Completion frees the driver and bumps its completed count; every
    /// successful transition is pushed to the requester.
    pub async fn advance_status(
        &self,
        driver_id: Uuid,
        booking_id: Uuid,
        new_status: BookingStatus,
    ) -> Result<Booking, DispatchError> {
        let booking = self
            .bookings
            .advance_status(booking_id, driver_id, new_status, Utc::now())
            .await?;

        if booking.status == BookingStatus::Completed {
            if let Err(err) = self.drivers.increment_completed(driver_id).await {
                warn!(driver_id = %driver_id, error = %err, "failed to increment completed count");
            }
            self.drivers.release_booking(driver_id).await?;
            self.broadcast_driver_status(driver_id, DriverStatus::Available)
                .await;
        }

        if let Err(err) = self
            .bus
            .publish(
                Recipient::Id(booking.requester_id),
                EventKind::StatusUpdate,
                json!({ "booking_id": booking.id, "status": booking.status }),
            )
            .await
        {
            warn!(booking_id = %booking.id, error = %err, "failed to push status update");
        }

        info!(booking_id = %booking.id, status = ?booking.status, "booking status advanced");
        Ok(booking)
    }

    /// One activator sweep: offer every scheduled booking whose time has
    /// come. Each booking is handled independently; a booking that was
    /// claimed between the query and the sweep is skipped.
    pub async fn activate_scheduled(&self) -> Result<usize, DispatchError> {
        let due = self.bookings.due_scheduled(Utc::now()).await?;
        let mut activated = 0;

        for booking in due {
            let booking = match self.bookings.reopen_offer(booking.id).await {
                Ok(booking) => booking,
                Err(err) => {
                    warn!(booking_id = %booking.id, error = %err, "skipping activation");
                    continue;
                }
            };

            match self.assign_booking_to_drivers(&booking).await {
                Ok(()) => activated += 1,
                Err(err) => {
                    warn!(booking_id = %booking.id, error = %err, "failed to offer scheduled booking")
                }
            }
        }

        Ok(activated)
    }

    async fn broadcast_driver_status(&self, driver_id: Uuid, status: DriverStatus) {
        if let Err(err) = self
            .bus
            .publish(
                Recipient::Admins,
                EventKind::DriverStatusUpdate,
                json!({ "driver_id": driver_id, "status": status }),
            )
            .await
        {
            warn!(driver_id = %driver_id, error = %err, "failed to broadcast driver status");
        }
    }
}
