use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DriverStatus {
    Available,
    Busy,
    Offline,
}

/// Vehicle classes carry fixed per-kilometer rates; classes we do not
/// recognize deserialize as `Other` and bill at the premium rate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Bike,
    Car,
    Van,
    #[serde(other)]
    Other,
}

impl VehicleClass {
    pub fn rate_per_km(&self) -> f64 {
        match self {
            VehicleClass::Bike => 6.0,
            VehicleClass::Car => 12.0,
            VehicleClass::Van => 18.0,
            VehicleClass::Other => 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub vehicle_class: VehicleClass,
    pub location: GeoPoint,
    pub status: DriverStatus,
    pub current_booking_id: Option<Uuid>,
    pub offers_received: u64,
    pub accepted_count: u64,
    pub completed_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::VehicleClass;

    #[test]
    fn unknown_class_deserializes_to_premium_rate() {
        let class: VehicleClass = serde_json::from_str("\"hovercraft\"").unwrap();
        assert_eq!(class, VehicleClass::Other);
        assert_eq!(class.rate_per_km(), 30.0);
    }

    #[test]
    fn known_classes_keep_their_rates() {
        assert_eq!(VehicleClass::Bike.rate_per_km(), 6.0);
        assert_eq!(VehicleClass::Car.rate_per_km(), 12.0);
        assert_eq!(VehicleClass::Van.rate_per_km(), 18.0);
    }
}
