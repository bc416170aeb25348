use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleCategory {
    X,
    Xl,
    Comfort,
    Green,
    Pets,
    Package,
    Priority,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChargeMethod {
    Cash,
    Card,
    Bank,
    Paypal,
    Bitcoin,
    Ethereum,
    Balance,
    CupTransaction,
    MlcTransaction,
}

impl ChargeMethod {
    /// Methods a trip can currently be settled with.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            ChargeMethod::Cash
                | ChargeMethod::Balance
                | ChargeMethod::CupTransaction
                | ChargeMethod::MlcTransaction
        )
    }
}

impl fmt::Display for ChargeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Trip lifecycle.
///
/// ```text
/// New ──confirm──▶ Confirmed ──accept──▶ OnTheWay ──start──▶ PickedUp ──finish──▶ DroppedOff
///                      ▲                     │                  │
///                      │ accept              │ driver cancel    │ driver cancel
///                 WaitingDriver ◀────────────┴──────────────────┘
/// ```
///
/// Every non-terminal state may also move to `Canceled` on an admin cancel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    WaitingDriver,
    Confirmed,
    OnTheWay,
    PickedUp,
    DroppedOff,
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::DroppedOff | OrderStatus::Canceled)
    }

    /// Orders in these states are waiting for a driver to accept them.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::WaitingDriver)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self, next),
            (New, Confirmed)
                | (New, Canceled)
                | (Confirmed, OnTheWay)
                | (Confirmed, Canceled)
                | (WaitingDriver, OnTheWay)
                | (WaitingDriver, Canceled)
                | (OnTheWay, PickedUp)
                | (OnTheWay, WaitingDriver)
                | (OnTheWay, Canceled)
                | (PickedUp, DroppedOff)
                | (PickedUp, WaitingDriver)
                | (PickedUp, Canceled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::New => "NEW",
            OrderStatus::WaitingDriver => "WAITING_DRIVER",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::OnTheWay => "ON_THE_WAY",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::DroppedOff => "DROPPED_OFF",
            OrderStatus::Canceled => "CANCELED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub points: Vec<GeoPoint>,
    #[serde(default)]
    pub riders: u32,
    #[serde(default)]
    pub baggages: bool,
    #[serde(default)]
    pub carry_pet: bool,
    #[serde(default)]
    pub coupon: String,
    #[serde(default)]
    pub currency: String,
}

impl Item {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.points.len() < 2 {
            return Err(AppError::InvalidInput(
                "a trip needs at least two route points".to_string(),
            ));
        }

        if let Some(point) = self.points.iter().find(|point| !point.is_valid()) {
            return Err(AppError::InvalidInput(format!(
                "route point {},{} is out of range",
                point.lat, point.lng
            )));
        }

        Ok(())
    }

    pub fn pickup(&self) -> Option<&GeoPoint> {
        self.points.first()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryPrice {
    pub category: VehicleCategory,
    pub price: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub distance: f64,
    pub duration: f64,
    pub geometry: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub item: Item,
    pub status: OrderStatus,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub rider: String,
    pub driver: Option<String>,
    #[serde(default)]
    pub banned_drivers: BTreeMap<String, bool>,
    pub route: Option<Route>,
    pub distance: f64,
    pub duration: f64,
    #[serde(default)]
    pub route_string: String,
    pub currency: String,
    #[serde(default)]
    pub category_price: Vec<CategoryPrice>,
    pub selected_category: Option<CategoryPrice>,
    pub price: Option<i64>,
    pub charge_method: Option<ChargeMethod>,
    pub charge_id: Option<String>,
    #[serde(rename = "rate")]
    pub rating: Option<f64>,
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(id: String, rider: String, item: Item, currency: String) -> Self {
        let now = Utc::now();

        Self {
            id,
            item,
            status: OrderStatus::New,
            status_history: vec![StatusChange {
                status: OrderStatus::New,
                changed_at: now,
            }],
            rider,
            driver: None,
            banned_drivers: BTreeMap::new(),
            route: None,
            distance: 0.0,
            duration: 0.0,
            route_string: String::new(),
            currency,
            category_price: Vec::new(),
            selected_category: None,
            price: None,
            charge_method: None,
            charge_id: None,
            rating: None,
            review: None,
            created_at: now,
            updated_at: now,
            start_at: None,
            end_at: None,
        }
    }

    /// Moves the order along the lifecycle graph, leaving it untouched on an invalid edge.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        self.status = next;
        self.status_history.push(StatusChange {
            status: next,
            changed_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    pub fn is_banned(&self, driver_id: &str) -> bool {
        self.banned_drivers.get(driver_id).copied().unwrap_or(false)
    }

    pub fn ban_driver(&mut self, driver_id: &str) {
        self.banned_drivers.insert(driver_id.to_string(), true);
    }

    pub fn is_assigned_to(&self, driver_id: &str) -> bool {
        self.driver.as_deref() == Some(driver_id)
    }

    pub fn quote_for(&self, category: VehicleCategory) -> Option<&CategoryPrice> {
        self.category_price
            .iter()
            .find(|quote| quote.category == category)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub rider: Option<String>,
    pub driver: Option<String>,
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub limit: usize,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderList {
    pub token: Option<String>,
    pub data: Vec<Order>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmOrder {
    pub category: VehicleCategory,
    pub method: ChargeMethod,
}
