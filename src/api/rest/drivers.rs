use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::{ok, Ack};
use crate::auth::{Caller, Role};
use crate::error::AppError;
use crate::models::driver::{AvailabilityUpdate, DriverLocation, GeoPoint, NearbyDriver};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/location", post(report_location))
        .route("/drivers/availability", post(report_availability))
        .route("/drivers/nearby", get(nearby_drivers))
}

#[derive(Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub available: bool,
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
    pub limit: Option<usize>,
}

// Reports are queued; the response only confirms they were accepted.
async fn report_location(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<LocationRequest>,
) -> Result<Json<Ack>, AppError> {
    caller.require(Role::Driver)?;

    state
        .feed
        .push_location(DriverLocation {
            driver_id: caller.id,
            lat: req.lat,
            lng: req.lng,
        })
        .await?;
    Ok(ok())
}

async fn report_availability(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<Ack>, AppError> {
    caller.require(Role::Driver)?;

    state
        .feed
        .push_availability(AvailabilityUpdate {
            driver_id: caller.id,
            available: req.available,
        })
        .await?;
    Ok(ok())
}

async fn nearby_drivers(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<NearbyDriver>>, AppError> {
    caller.require(Role::Admin)?;

    let point = GeoPoint {
        lat: query.lat,
        lng: query.lng,
    };
    if !point.is_valid() {
        return Err(AppError::InvalidInput(format!(
            "location {},{} is out of range",
            point.lat, point.lng
        )));
    }

    let radius_km = query.radius_km.unwrap_or(state.dispatch_radius_km);
    let limit = query.limit.unwrap_or(state.dispatch_limit);
    let drivers = state.geo.nearby(&point, radius_km, limit).await?;
    Ok(Json(drivers))
}
