pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::booking::{Booking, BookingStatus};
use crate::models::driver::{Driver, DriverStatus, GeoPoint, VehicleClass};

/// Persistence contract for bookings.
///
/// `claim`, `reject_offer`, `reopen_offer` and `advance_status` are single
/// conditional writes: the precondition check and the mutation happen inside
/// one store-side critical section, so two concurrent callers can never both
/// observe the precondition and both win.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create(&self, booking: Booking) -> Result<(), DispatchError>;

    async fn find(&self, id: Uuid) -> Result<Booking, DispatchError>;

    /// Bookings that are not yet completed, as the demand input to surge.
    async fn active_count(&self) -> Result<u64, DispatchError>;

    /// The booking a driver is currently working, between claim and
    /// delivery, if any.
    async fn find_active_by_driver(
        &self,
        driver_id: Uuid,
    ) -> Result<Option<Booking>, DispatchError>;

    /// Unclaimed bookings whose scheduled activation time has passed.
    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, DispatchError>;

    /// Resolve the outstanding offer in the driver's favor. Succeeds only
    /// while the offer is still pending; the booking comes back with the
    /// driver bound and its status at `DriverAssigned`.
    async fn claim(&self, id: Uuid, driver_id: Uuid) -> Result<Booking, DispatchError>;

    /// Resolve the outstanding offer as rejected, recording the rejecting
    /// driver so later offer cycles skip it. Succeeds only while the offer
    /// is still pending.
    async fn reject_offer(&self, id: Uuid, driver_id: Uuid) -> Result<Booking, DispatchError>;

    /// Re-arm the offer for the next broadcast cycle. Fails once the
    /// booking itself has been claimed.
    async fn reopen_offer(&self, id: Uuid) -> Result<Booking, DispatchError>;

    /// Advance the lifecycle by exactly one step on behalf of the bound
    /// driver, stamping `started_at` / `completed_at` the first time those
    /// stages are reached.
    async fn advance_status(
        &self,
        id: Uuid,
        driver_id: Uuid,
        new_status: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<Booking, DispatchError>;
}

/// Persistence contract for the driver directory.
#[async_trait]
pub trait DriverRepository: Send + Sync {
    async fn create(&self, driver: Driver) -> Result<(), DispatchError>;

    async fn find(&self, id: Uuid) -> Result<Driver, DispatchError>;

    async fn all(&self) -> Result<Vec<Driver>, DispatchError>;

    async fn available_count(&self) -> Result<u64, DispatchError>;

    /// Available drivers of the class within `radius_km` of `near`,
    /// excluding the given identities.
    async fn find_available(
        &self,
        near: &GeoPoint,
        class: &VehicleClass,
        radius_km: f64,
        exclude: &[Uuid],
    ) -> Result<Vec<Driver>, DispatchError>;

    async fn update_status(&self, id: Uuid, status: DriverStatus)
        -> Result<Driver, DispatchError>;

    async fn update_location(&self, id: Uuid, location: GeoPoint)
        -> Result<Driver, DispatchError>;

    /// Bind the driver to a claimed booking and mark it busy.
    async fn assign_booking(&self, id: Uuid, booking_id: Uuid) -> Result<Driver, DispatchError>;

    /// Clear the booking binding and return the driver to the pool.
    async fn release_booking(&self, id: Uuid) -> Result<Driver, DispatchError>;

    async fn increment_offers(&self, id: Uuid) -> Result<(), DispatchError>;

    async fn increment_accepted(&self, id: Uuid) -> Result<(), DispatchError>;

    async fn increment_completed(&self, id: Uuid) -> Result<(), DispatchError>;
}
