pub mod devices;
pub mod drivers;
pub mod orders;
pub mod rates;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(orders::router())
        .merge(rates::router())
        .merge(drivers::router())
        .merge(devices::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Body returned by mutations that have nothing else to report.
#[derive(Serialize)]
pub struct Ack {
    success: bool,
}

pub(crate) fn ok() -> Json<Ack> {
    Json(Ack { success: true })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    rates: usize,
    category_rates: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        rates: state.catalog.rates().await.len(),
        category_rates: state.catalog.category_rates().await.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
