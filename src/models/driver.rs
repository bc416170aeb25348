use serde::{Deserialize, Serialize};

use crate::models::order::Order;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Raw position report from a driver's device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverLocation {
    pub driver_id: String,
    pub lat: f64,
    pub lng: f64,
}

impl DriverLocation {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityUpdate {
    pub driver_id: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyDriver {
    pub driver_id: String,
    pub location: GeoPoint,
    pub distance_km: f64,
}

/// What a driver's device is shown about a trip offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderNotification {
    pub id: String,
    pub cost: i64,
    pub currency: String,
    pub distance: i64,
    pub duration: i64,
}

impl From<&Order> for OrderNotification {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.clone(),
            cost: order.price.unwrap_or_default(),
            currency: order.currency.clone(),
            distance: order.distance as i64,
            duration: order.duration as i64,
        }
    }
}
