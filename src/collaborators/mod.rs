//! Services the order engine talks to but does not own.

pub mod directions;
pub mod notifier;
pub mod users;

use async_trait::async_trait;

use crate::auth::Role;
use crate::error::AppError;
use crate::models::driver::{GeoPoint, OrderNotification};
use crate::models::order::Route;

#[derive(Debug, Clone, Default)]
pub struct DirectionsResponse {
    /// Metres.
    pub distance: f64,
    /// Seconds.
    pub duration: f64,
    pub routes: Vec<Route>,
    /// Provider response as received, kept for clients that render the route.
    pub raw_body: String,
}

#[async_trait]
pub trait Directions: Send + Sync {
    async fn get_route(&self, points: &[GeoPoint]) -> Result<DirectionsResponse, AppError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Push tokens of the given users that hold `role`.
    async fn get_user_devices(&self, user_ids: &[String], role: Role)
        -> Result<Vec<String>, AppError>;

    async fn set_availability(&self, user_id: &str, available: bool) -> Result<(), AppError>;

    /// Attaches a push token to `user_id`, creating the user on first sight.
    async fn register_device(&self, user_id: &str, role: Role, token: &str)
        -> Result<(), AppError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_to_devices(
        &self,
        devices: &[String],
        order: &OrderNotification,
    ) -> Result<(), AppError>;

    async fn notify_rider_order_accepted(
        &self,
        devices: &[String],
        order: &OrderNotification,
    ) -> Result<(), AppError>;
}
