use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::{GeoPoint, VehicleClass};

/// Delivery lifecycle. Transitions are strictly linear: every status has at
/// most one successor, and only the assigned driver may advance a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum BookingStatus {
    Pending,
    DriverAssigned,
    EnRouteToPickup,
    GoodsCollected,
    InTransit,
    Delivered,
    Completed,
}

impl BookingStatus {
    /// The only status a booking may advance to from `self`, if any.
    pub fn successor(&self) -> Option<BookingStatus> {
        match self {
            BookingStatus::DriverAssigned => Some(BookingStatus::EnRouteToPickup),
            BookingStatus::EnRouteToPickup => Some(BookingStatus::GoodsCollected),
            BookingStatus::GoodsCollected => Some(BookingStatus::InTransit),
            BookingStatus::InTransit => Some(BookingStatus::Delivered),
            BookingStatus::Delivered => Some(BookingStatus::Completed),
            BookingStatus::Pending | BookingStatus::Completed => None,
        }
    }
}

/// State of the outstanding offer broadcast for a booking, separate from the
/// booking lifecycle itself. A rejected offer may be reopened for the next
/// broadcast cycle; an accepted one never is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OfferState {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub vehicle_class: VehicleClass,
    pub price: f64,
    pub status: BookingStatus,
    pub driver_response: OfferState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected_drivers: Vec<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub vehicle_class: VehicleClass,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceEstimateRequest {
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub vehicle_class: VehicleClass,
}
