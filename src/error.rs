use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::order::{ChargeMethod, OrderStatus};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("order already accepted")]
    OrderAccepted,

    #[error("order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("unsupported charge method: {0}")]
    UnsupportedChargeMethod(ChargeMethod),

    #[error("no drivers available")]
    NoAvailableDrivers,

    #[error("no devices registered for the candidate drivers")]
    NoDevices,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// The request field an error refers to, as reported to clients.
    pub fn field(&self) -> &'static str {
        match self {
            AppError::AccessDenied(_) => "caller",
            AppError::NotFound(_) => "id",
            AppError::InvalidInput(_) => "input",
            AppError::InvalidCurrency(_) => "currency",
            AppError::OrderAccepted => "driver",
            AppError::InvalidTransition { .. } => "status",
            AppError::UnsupportedChargeMethod(_) => "charge_method",
            AppError::NoAvailableDrivers | AppError::NoDevices | AppError::Internal(_) => "",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AccessDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_)
            | AppError::InvalidCurrency(_)
            | AppError::UnsupportedChargeMethod(_) => StatusCode::BAD_REQUEST,
            AppError::OrderAccepted | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::NoAvailableDrivers | AppError::NoDevices => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = Json(json!({
            "success": false,
            "errors": [{
                "field": self.field(),
                "message": self.to_string(),
            }]
        }));

        (status, body).into_response()
    }
}
