use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::DispatchError;
use crate::geo::haversine_km;
use crate::models::driver::GeoPoint;

const AVERAGE_SPEED_KMH: f64 = 40.0;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_min: f64,
}

/// Resolves a trip into distance and duration. A backend that cannot
/// resolve the route fails the quote; there is no retry at this layer.
#[async_trait]
pub trait DistanceCalculator: Send + Sync {
    async fn estimate(
        &self,
        pickup: &GeoPoint,
        dropoff: &GeoPoint,
    ) -> Result<RouteEstimate, DispatchError>;
}

/// Straight-line estimate; duration assumes city traffic at 40 km/h.
pub struct GreatCircleCalculator;

#[async_trait]
impl DistanceCalculator for GreatCircleCalculator {
    async fn estimate(
        &self,
        pickup: &GeoPoint,
        dropoff: &GeoPoint,
    ) -> Result<RouteEstimate, DispatchError> {
        let distance_km = haversine_km(pickup, dropoff);
        Ok(RouteEstimate {
            distance_km,
            duration_min: distance_km / AVERAGE_SPEED_KMH * 60.0,
        })
    }
}

/// Road-network estimate from an OSRM-compatible routing service.
pub struct RoutingCalculator {
    client: reqwest::Client,
    endpoint: String,
}

impl RoutingCalculator {
    pub fn new(endpoint: &str) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                DispatchError::Dependency(format!("failed to build routing client: {err}"))
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct RouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Deserialize)]
struct Route {
    /// Meters.
    distance: f64,
    /// Seconds.
    duration: f64,
}

#[async_trait]
impl DistanceCalculator for RoutingCalculator {
    async fn estimate(
        &self,
        pickup: &GeoPoint,
        dropoff: &GeoPoint,
    ) -> Result<RouteEstimate, DispatchError> {
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}?overview=false",
            self.endpoint, pickup.lng, pickup.lat, dropoff.lng, dropoff.lat
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| DispatchError::Dependency(format!("routing request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(DispatchError::Dependency(format!(
                "routing service returned {}",
                response.status()
            )));
        }

        let body: RouteResponse = response.json().await.map_err(|err| {
            DispatchError::Dependency(format!("routing response decode failed: {err}"))
        })?;

        if body.code != "Ok" {
            return Err(DispatchError::Dependency(format!(
                "routing service error: {}",
                body.code
            )));
        }

        let route = body.routes.first().ok_or_else(|| {
            DispatchError::Dependency("routing service returned no routes".to_string())
        })?;

        Ok(RouteEstimate {
            distance_km: route.distance / 1000.0,
            duration_min: route.duration / 60.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DistanceCalculator, GreatCircleCalculator};
    use crate::models::driver::GeoPoint;

    #[tokio::test]
    async fn great_circle_duration_tracks_distance() {
        let pickup = GeoPoint { lat: 0.0, lng: 0.0 };
        let dropoff = GeoPoint {
            lat: 0.0,
            lng: 0.36,
        };

        let estimate = GreatCircleCalculator
            .estimate(&pickup, &dropoff)
            .await
            .unwrap();

        assert!((estimate.distance_km - 40.0).abs() < 0.2);
        assert!((estimate.duration_min - 60.0).abs() < 0.5);
    }
}
