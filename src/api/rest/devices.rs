use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::{ok, Ack};
use crate::auth::{Caller, Role};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/devices", post(register_device))
}

#[derive(Deserialize)]
pub struct RegisterDeviceRequest {
    pub token: String,
}

/// Riders and drivers register the push token notifications go to.
async fn register_device(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<Json<Ack>, AppError> {
    caller.require_any(&[Role::Rider, Role::Driver])?;

    state
        .users
        .register_device(&caller.id, caller.role, req.token.trim())
        .await?;
    Ok(ok())
}
