use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::{ok, Ack};
use crate::auth::Caller;
use crate::error::AppError;
use crate::models::order::{CategoryPrice, ConfirmOrder, Item, Order, OrderFilter, OrderList};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order).put(update_order))
        .route("/orders/:id/confirm", post(confirm_order))
        .route("/orders/:id/accept", post(accept_order))
        .route("/orders/:id/start", post(start_order))
        .route("/orders/:id/finish", post(finish_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/rate", post(rate_order))
        .route("/orders/:id/categories", get(order_categories))
}

#[derive(Deserialize)]
pub struct RateOrderRequest {
    pub rate: f64,
    #[serde(default)]
    pub comment: String,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(item): Json<Item>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.create(&caller, item).await?;
    Ok(Json(order))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<OrderList>, AppError> {
    let list = state.orders.find_all(&caller, filter).await?;
    Ok(Json(list))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.find_by_id(&caller, &id).await?;
    Ok(Json(order))
}

async fn update_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(item): Json<Item>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.update(&caller, &id, item).await?;
    Ok(Json(order))
}

async fn confirm_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<ConfirmOrder>,
) -> Result<Json<Ack>, AppError> {
    state.orders.confirm_order(&caller, &id, req).await?;
    Ok(ok())
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    state.orders.accept_order(&caller, &id).await?;
    Ok(ok())
}

async fn start_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    state.orders.start_order(&caller, &id).await?;
    Ok(ok())
}

async fn finish_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    state.orders.finish_order(&caller, &id).await?;
    Ok(ok())
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    state.orders.cancel_order(&caller, &id).await?;
    Ok(ok())
}

async fn rate_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<RateOrderRequest>,
) -> Result<Json<Ack>, AppError> {
    state
        .orders
        .rate_order(&caller, &id, req.rate, req.comment)
        .await?;
    Ok(ok())
}

async fn order_categories(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<CategoryPrice>>, AppError> {
    let categories = state.orders.categories(&caller, &id).await?;
    Ok(Json(categories))
}
