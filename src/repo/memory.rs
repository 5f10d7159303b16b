use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::geo::haversine_km;
use crate::models::booking::{Booking, BookingStatus, OfferState};
use crate::models::driver::{Driver, DriverStatus, GeoPoint, VehicleClass};
use crate::repo::{BookingRepository, DriverRepository};

/// In-memory booking store. Conditional writes run under the map's
/// per-entry lock, which gives them the atomicity the claim protocol
/// requires without any coordination above the store.
#[derive(Default)]
pub struct InMemoryBookings {
    map: DashMap<Uuid, Booking>,
}

impl InMemoryBookings {
    pub fn new() -> Self {
        Self::default()
    }
}

fn booking_not_found(id: Uuid) -> DispatchError {
    DispatchError::NotFound(format!("booking {id} not found"))
}

fn driver_not_found(id: Uuid) -> DispatchError {
    DispatchError::NotFound(format!("driver {id} not found"))
}

fn in_flight(status: &BookingStatus) -> bool {
    matches!(
        status,
        BookingStatus::DriverAssigned
            | BookingStatus::EnRouteToPickup
            | BookingStatus::GoodsCollected
            | BookingStatus::InTransit
    )
}

#[async_trait]
impl BookingRepository for InMemoryBookings {
    async fn create(&self, booking: Booking) -> Result<(), DispatchError> {
        self.map.insert(booking.id, booking);
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Booking, DispatchError> {
        self.map
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| booking_not_found(id))
    }

    async fn active_count(&self) -> Result<u64, DispatchError> {
        let count = self
            .map
            .iter()
            .filter(|entry| entry.value().status != BookingStatus::Completed)
            .count();
        Ok(count as u64)
    }

    async fn find_active_by_driver(
        &self,
        driver_id: Uuid,
    ) -> Result<Option<Booking>, DispatchError> {
        let booking = self.map.iter().find_map(|entry| {
            let booking = entry.value();
            if booking.driver_id == Some(driver_id) && in_flight(&booking.status) {
                Some(booking.clone())
            } else {
                None
            }
        });
        Ok(booking)
    }

    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, DispatchError> {
        let due = self
            .map
            .iter()
            .filter(|entry| {
                let booking = entry.value();
                booking.status == BookingStatus::Pending
                    && booking.scheduled_at.is_some_and(|at| at <= now)
            })
            .map(|entry| entry.value().clone())
            .collect();
        Ok(due)
    }

    async fn claim(&self, id: Uuid, driver_id: Uuid) -> Result<Booking, DispatchError> {
        let mut entry = self.map.get_mut(&id).ok_or_else(|| booking_not_found(id))?;
        let booking = entry.value_mut();

        if booking.driver_response != OfferState::Pending {
            return Err(DispatchError::StateConflict(
                "offer already resolved".to_string(),
            ));
        }

        booking.driver_response = OfferState::Accepted;
        booking.driver_id = Some(driver_id);
        booking.status = BookingStatus::DriverAssigned;
        Ok(booking.clone())
    }

    async fn reject_offer(&self, id: Uuid, driver_id: Uuid) -> Result<Booking, DispatchError> {
        let mut entry = self.map.get_mut(&id).ok_or_else(|| booking_not_found(id))?;
        let booking = entry.value_mut();

        if booking.driver_response != OfferState::Pending {
            return Err(DispatchError::StateConflict(
                "offer already resolved".to_string(),
            ));
        }

        booking.driver_response = OfferState::Rejected;
        if !booking.rejected_drivers.contains(&driver_id) {
            booking.rejected_drivers.push(driver_id);
        }
        Ok(booking.clone())
    }

    async fn reopen_offer(&self, id: Uuid) -> Result<Booking, DispatchError> {
        let mut entry = self.map.get_mut(&id).ok_or_else(|| booking_not_found(id))?;
        let booking = entry.value_mut();

        if booking.status != BookingStatus::Pending {
            return Err(DispatchError::StateConflict(
                "booking already claimed".to_string(),
            ));
        }

        booking.driver_response = OfferState::Pending;
        Ok(booking.clone())
    }

    async fn advance_status(
        &self,
        id: Uuid,
        driver_id: Uuid,
        new_status: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<Booking, DispatchError> {
        let mut entry = self.map.get_mut(&id).ok_or_else(|| booking_not_found(id))?;
        let booking = entry.value_mut();

        if booking.driver_id != Some(driver_id) {
            return Err(DispatchError::Permission(
                "driver not assigned to this booking".to_string(),
            ));
        }

        match booking.status.successor() {
            Some(next) if next == new_status => {}
            _ => {
                return Err(DispatchError::StateConflict(format!(
                    "cannot transition from {:?} to {:?}",
                    booking.status, new_status
                )))
            }
        }

        booking.status = new_status;
        match booking.status {
            BookingStatus::InTransit if booking.started_at.is_none() => {
                booking.started_at = Some(now);
            }
            BookingStatus::Completed if booking.completed_at.is_none() => {
                booking.completed_at = Some(now);
            }
            _ => {}
        }

        Ok(booking.clone())
    }
}

/// In-memory driver directory.
#[derive(Default)]
pub struct InMemoryDrivers {
    map: DashMap<Uuid, Driver>,
}

impl InMemoryDrivers {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch<F>(&self, id: Uuid, mutate: F) -> Result<Driver, DispatchError>
    where
        F: FnOnce(&mut Driver),
    {
        let mut entry = self.map.get_mut(&id).ok_or_else(|| driver_not_found(id))?;
        let driver = entry.value_mut();
        mutate(driver);
        driver.updated_at = Utc::now();
        Ok(driver.clone())
    }
}

#[async_trait]
impl DriverRepository for InMemoryDrivers {
    async fn create(&self, driver: Driver) -> Result<(), DispatchError> {
        self.map.insert(driver.id, driver);
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Driver, DispatchError> {
        self.map
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| driver_not_found(id))
    }

    async fn all(&self) -> Result<Vec<Driver>, DispatchError> {
        Ok(self.map.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn available_count(&self) -> Result<u64, DispatchError> {
        let count = self
            .map
            .iter()
            .filter(|entry| entry.value().status == DriverStatus::Available)
            .count();
        Ok(count as u64)
    }

    async fn find_available(
        &self,
        near: &GeoPoint,
        class: &VehicleClass,
        radius_km: f64,
        exclude: &[Uuid],
    ) -> Result<Vec<Driver>, DispatchError> {
        let candidates = self
            .map
            .iter()
            .filter(|entry| {
                let driver = entry.value();
                driver.status == DriverStatus::Available
                    && driver.vehicle_class == *class
                    && !exclude.contains(&driver.id)
                    && haversine_km(&driver.location, near) <= radius_km
            })
            .map(|entry| entry.value().clone())
            .collect();
        Ok(candidates)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: DriverStatus,
    ) -> Result<Driver, DispatchError> {
        self.touch(id, |driver| driver.status = status)
    }

    async fn update_location(
        &self,
        id: Uuid,
        location: GeoPoint,
    ) -> Result<Driver, DispatchError> {
        self.touch(id, |driver| driver.location = location)
    }

    async fn assign_booking(&self, id: Uuid, booking_id: Uuid) -> Result<Driver, DispatchError> {
        self.touch(id, |driver| {
            driver.current_booking_id = Some(booking_id);
            driver.status = DriverStatus::Busy;
        })
    }

    async fn release_booking(&self, id: Uuid) -> Result<Driver, DispatchError> {
        self.touch(id, |driver| {
            driver.current_booking_id = None;
            driver.status = DriverStatus::Available;
        })
    }

    async fn increment_offers(&self, id: Uuid) -> Result<(), DispatchError> {
        self.touch(id, |driver| driver.offers_received += 1)?;
        Ok(())
    }

    async fn increment_accepted(&self, id: Uuid) -> Result<(), DispatchError> {
        self.touch(id, |driver| driver.accepted_count += 1)?;
        Ok(())
    }

    async fn increment_completed(&self, id: Uuid) -> Result<(), DispatchError> {
        self.touch(id, |driver| driver.completed_count += 1)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{InMemoryBookings, InMemoryDrivers};
    use crate::error::DispatchError;
    use crate::models::booking::{Booking, BookingStatus, OfferState};
    use crate::models::driver::{Driver, DriverStatus, GeoPoint, VehicleClass};
    use crate::repo::{BookingRepository, DriverRepository};

    fn booking(status: BookingStatus) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            driver_id: None,
            pickup: GeoPoint { lat: 0.0, lng: 0.0 },
            dropoff: GeoPoint { lat: 0.0, lng: 0.09 },
            vehicle_class: VehicleClass::Car,
            price: 120.0,
            status,
            driver_response: OfferState::Pending,
            rejected_drivers: Vec::new(),
            scheduled_at: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn driver(lat: f64, lng: f64, class: VehicleClass) -> Driver {
        let now = Utc::now();
        Driver {
            id: Uuid::new_v4(),
            name: "test-driver".to_string(),
            vehicle_class: class,
            location: GeoPoint { lat, lng },
            status: DriverStatus::Available,
            current_booking_id: None,
            offers_received: 0,
            accepted_count: 0,
            completed_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn second_claim_on_the_same_offer_conflicts() {
        let repo = InMemoryBookings::new();
        let b = booking(BookingStatus::Pending);
        let id = b.id;
        repo.create(b).await.unwrap();

        let winner = Uuid::new_v4();
        let loser = Uuid::new_v4();

        let claimed = repo.claim(id, winner).await.unwrap();
        assert_eq!(claimed.driver_id, Some(winner));
        assert_eq!(claimed.status, BookingStatus::DriverAssigned);
        assert_eq!(claimed.driver_response, OfferState::Accepted);

        let err = repo.claim(id, loser).await.unwrap_err();
        assert!(matches!(err, DispatchError::StateConflict(_)));
    }

    #[tokio::test]
    async fn rejected_offer_can_be_reopened_until_claimed() {
        let repo = InMemoryBookings::new();
        let b = booking(BookingStatus::Pending);
        let id = b.id;
        repo.create(b).await.unwrap();

        let rejector = Uuid::new_v4();
        let rejected = repo.reject_offer(id, rejector).await.unwrap();
        assert_eq!(rejected.driver_response, OfferState::Rejected);
        assert!(rejected.rejected_drivers.contains(&rejector));

        let reopened = repo.reopen_offer(id).await.unwrap();
        assert_eq!(reopened.driver_response, OfferState::Pending);

        let winner = Uuid::new_v4();
        repo.claim(id, winner).await.unwrap();

        let err = repo.reopen_offer(id).await.unwrap_err();
        assert!(matches!(err, DispatchError::StateConflict(_)));
    }

    #[tokio::test]
    async fn advance_status_stamps_timestamps_once() {
        let repo = InMemoryBookings::new();
        let driver_id = Uuid::new_v4();
        let b = booking(BookingStatus::Pending);
        let id = b.id;
        repo.create(b).await.unwrap();
        repo.claim(id, driver_id).await.unwrap();

        let now = Utc::now();
        repo.advance_status(id, driver_id, BookingStatus::EnRouteToPickup, now)
            .await
            .unwrap();
        repo.advance_status(id, driver_id, BookingStatus::GoodsCollected, now)
            .await
            .unwrap();

        let in_transit = repo
            .advance_status(id, driver_id, BookingStatus::InTransit, now)
            .await
            .unwrap();
        let started_at = in_transit.started_at.unwrap();

        // A repeated identical transition is rejected and changes nothing.
        let err = repo
            .advance_status(
                id,
                driver_id,
                BookingStatus::InTransit,
                now + Duration::seconds(30),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::StateConflict(_)));
        assert_eq!(repo.find(id).await.unwrap().started_at, Some(started_at));
    }

    #[tokio::test]
    async fn advance_status_rejects_strangers() {
        let repo = InMemoryBookings::new();
        let driver_id = Uuid::new_v4();
        let b = booking(BookingStatus::Pending);
        let id = b.id;
        repo.create(b).await.unwrap();
        repo.claim(id, driver_id).await.unwrap();

        let err = repo
            .advance_status(
                id,
                Uuid::new_v4(),
                BookingStatus::EnRouteToPickup,
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Permission(_)));
    }

    #[tokio::test]
    async fn advance_status_rejects_skipped_steps() {
        let repo = InMemoryBookings::new();
        let driver_id = Uuid::new_v4();
        let b = booking(BookingStatus::Pending);
        let id = b.id;
        repo.create(b).await.unwrap();
        repo.claim(id, driver_id).await.unwrap();

        let err = repo
            .advance_status(id, driver_id, BookingStatus::Completed, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::StateConflict(_)));
        assert_eq!(
            repo.find(id).await.unwrap().status,
            BookingStatus::DriverAssigned
        );
    }

    #[tokio::test]
    async fn due_scheduled_skips_future_and_claimed_bookings() {
        let repo = InMemoryBookings::new();
        let now = Utc::now();

        let mut due = booking(BookingStatus::Pending);
        due.scheduled_at = Some(now - Duration::minutes(5));
        let due_id = due.id;

        let mut future = booking(BookingStatus::Pending);
        future.scheduled_at = Some(now + Duration::hours(1));

        let mut claimed = booking(BookingStatus::DriverAssigned);
        claimed.scheduled_at = Some(now - Duration::minutes(5));

        repo.create(due).await.unwrap();
        repo.create(future).await.unwrap();
        repo.create(claimed).await.unwrap();

        let found = repo.due_scheduled(now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due_id);
    }

    #[tokio::test]
    async fn find_available_filters_class_radius_and_exclusions() {
        let repo = InMemoryDrivers::new();
        let pickup = GeoPoint { lat: 0.0, lng: 0.0 };

        let near_car = driver(0.001, 0.001, VehicleClass::Car);
        let excluded_car = driver(0.002, 0.0, VehicleClass::Car);
        let far_car = driver(1.0, 1.0, VehicleClass::Car);
        let near_van = driver(0.001, 0.0, VehicleClass::Van);
        let mut busy_car = driver(0.0, 0.001, VehicleClass::Car);
        busy_car.status = DriverStatus::Busy;

        let near_id = near_car.id;
        let excluded_id = excluded_car.id;

        for d in [near_car, excluded_car, far_car, near_van, busy_car] {
            repo.create(d).await.unwrap();
        }

        let found = repo
            .find_available(&pickup, &VehicleClass::Car, 5.0, &[excluded_id])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, near_id);
    }

    #[tokio::test]
    async fn assign_and_release_toggle_status_and_binding() {
        let repo = InMemoryDrivers::new();
        let d = driver(0.0, 0.0, VehicleClass::Bike);
        let id = d.id;
        repo.create(d).await.unwrap();

        let booking_id = Uuid::new_v4();
        let busy = repo.assign_booking(id, booking_id).await.unwrap();
        assert_eq!(busy.status, DriverStatus::Busy);
        assert_eq!(busy.current_booking_id, Some(booking_id));

        let freed = repo.release_booking(id).await.unwrap();
        assert_eq!(freed.status, DriverStatus::Available);
        assert_eq!(freed.current_booking_id, None);
    }
}
