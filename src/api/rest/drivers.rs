use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::driver::{Driver, DriverStatus, GeoPoint, VehicleClass};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/:id/status", patch(update_status))
        .route("/drivers/:id/location", patch(update_location))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub name: String,
    pub vehicle_class: VehicleClass,
    pub location: GeoPoint,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<Driver>, DispatchError> {
    if payload.name.trim().is_empty() {
        return Err(DispatchError::Validation(
            "name cannot be empty".to_string(),
        ));
    }

    let driver = state
        .coordinator
        .register_driver(payload.name, payload.vehicle_class, payload.location)
        .await?;
    Ok(Json(driver))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Driver>>, DispatchError> {
    state.coordinator.all_drivers().await.map(Json)
}

#[derive(Deserialize)]
struct UpdateStatusRequest {
    status: DriverStatus,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, DispatchError> {
    state
        .coordinator
        .update_availability(id, payload.status)
        .await
        .map(Json)
}

#[derive(Deserialize)]
struct UpdateLocationRequest {
    location: GeoPoint,
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, DispatchError> {
    state
        .coordinator
        .update_location(id, payload.location)
        .await
        .map(Json)
}
