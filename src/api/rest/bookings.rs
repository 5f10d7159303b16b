use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::coordinator::OfferResponse;
use crate::error::DispatchError;
use crate::models::booking::{Booking, BookingRequest, BookingStatus, PriceEstimateRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/estimate", post(price_estimate))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/respond", post(respond_to_offer))
        .route("/bookings/:id/status", patch(advance_status))
}

/// The transport layer has already authenticated the caller; this header
/// is how it hands the verified identity down to the core.
fn identity_header(headers: &HeaderMap) -> Result<Uuid, DispatchError> {
    let raw = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| DispatchError::Validation("missing x-user-id header".to_string()))?;
    raw.parse()
        .map_err(|_| DispatchError::Validation("x-user-id must be a uuid".to_string()))
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<BookingRequest>,
) -> Result<Json<Booking>, DispatchError> {
    let requester = identity_header(&headers)?;
    let booking = state.engine.create_booking(requester, payload).await?;
    Ok(Json(booking))
}

#[derive(Serialize)]
struct PriceEstimateResponse {
    estimated_price: f64,
}

async fn price_estimate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PriceEstimateRequest>,
) -> Result<Json<PriceEstimateResponse>, DispatchError> {
    let estimated_price = state.engine.price_estimate(&payload).await?;
    Ok(Json(PriceEstimateResponse { estimated_price }))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, DispatchError> {
    state.bookings.find(id).await.map(Json)
}

#[derive(Deserialize)]
struct RespondRequest {
    driver_id: Uuid,
    response: OfferResponse,
}

async fn respond_to_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RespondRequest>,
) -> Result<StatusCode, DispatchError> {
    state
        .coordinator
        .respond_to_offer(payload.driver_id, id, payload.response)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct AdvanceStatusRequest {
    driver_id: Uuid,
    status: BookingStatus,
}

async fn advance_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceStatusRequest>,
) -> Result<Json<Booking>, DispatchError> {
    state
        .engine
        .advance_status(payload.driver_id, id, payload.status)
        .await
        .map(Json)
}
