use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::auth::{Caller, Role};
use crate::error::AppError;
use crate::models::rate::{Rate, RateRequest, VehicleCategoryRate, VehicleCategoryRateRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rates", post(create_rate).get(list_rates))
        .route("/rates/:id", get(get_rate).patch(update_rate))
        .route(
            "/vehicle-category-rates",
            post(create_category_rate).get(list_category_rates),
        )
        .route("/vehicle-category-rates/:id", patch(update_category_rate))
}

#[derive(Deserialize)]
pub struct RateQuery {
    pub code: Option<String>,
}

async fn create_rate(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<RateRequest>,
) -> Result<Json<Rate>, AppError> {
    let rate = state.catalog.create_rate(&caller, req).await?;
    Ok(Json(rate))
}

/// `?code=` narrows the listing to a single tariff and is admin-only.
async fn list_rates(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<RateQuery>,
) -> Result<Json<Vec<Rate>>, AppError> {
    match query.code {
        Some(code) => {
            let rate = state.catalog.find_rate_by_code(&caller, &code).await?;
            Ok(Json(vec![rate]))
        }
        None => Ok(Json(state.catalog.rates().await)),
    }
}

async fn get_rate(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Rate>, AppError> {
    let rate = state.catalog.find_rate(&id).await?;
    Ok(Json(rate))
}

async fn update_rate(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<RateRequest>,
) -> Result<Json<Rate>, AppError> {
    let rate = state.catalog.update_rate(&caller, &id, req).await?;
    Ok(Json(rate))
}

async fn create_category_rate(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<VehicleCategoryRateRequest>,
) -> Result<Json<VehicleCategoryRate>, AppError> {
    let rate = state.catalog.create_category_rate(&caller, req).await?;
    Ok(Json(rate))
}

async fn list_category_rates(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<VehicleCategoryRate>>, AppError> {
    caller.require_any(&[Role::Admin, Role::Rider, Role::Driver])?;
    Ok(Json(state.catalog.category_rates().await))
}

async fn update_category_rate(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<VehicleCategoryRateRequest>,
) -> Result<Json<VehicleCategoryRate>, AppError> {
    let rate = state.catalog.update_category_rate(&caller, &id, req).await?;
    Ok(Json(rate))
}
