use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::order::VehicleCategory;

/// A tariff. Amounts are in minor currency units.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Rate {
    pub id: String,
    pub code: String,
    pub base_price: i64,
    #[serde(default)]
    pub price_per_km: i64,
    #[serde(default)]
    pub price_per_min: i64,
    #[serde(default)]
    pub price_per_passenger: i64,
    #[serde(default)]
    pub price_per_baggage: i64,
    #[serde(default)]
    pub price_per_carry_pet: i64,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub min_km: Option<u32>,
    pub max_km: Option<u32>,
    #[serde(default)]
    pub high_demand: bool,
}

impl Rate {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.code.trim().is_empty() {
            return Err(AppError::InvalidInput("rate code is required".to_string()));
        }
        if self.base_price <= 0 {
            return Err(AppError::InvalidInput("base price must be > 0".to_string()));
        }
        if self.price_per_km <= 0 {
            return Err(AppError::InvalidInput(
                "price per km must be > 0".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(AppError::InvalidInput(
                    "start date must not be after end date".to_string(),
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.min_km, self.max_km) {
            if min > max {
                return Err(AppError::InvalidInput("min km must not exceed max km".to_string()));
            }
        }

        Ok(())
    }

    /// Applies the fields present in `req`, leaving the others as they are.
    pub fn apply(&mut self, req: RateRequest) {
        if let Some(code) = req.code.filter(|code| !code.is_empty()) {
            self.code = code;
        }
        if let Some(base_price) = req.base_price {
            self.base_price = base_price;
        }
        if let Some(value) = req.price_per_km {
            self.price_per_km = value;
        }
        if let Some(value) = req.price_per_min {
            self.price_per_min = value;
        }
        if let Some(value) = req.price_per_passenger {
            self.price_per_passenger = value;
        }
        if let Some(value) = req.price_per_baggage {
            self.price_per_baggage = value;
        }
        if let Some(value) = req.price_per_carry_pet {
            self.price_per_carry_pet = value;
        }
        if req.start_time.is_some() {
            self.start_time = req.start_time;
        }
        if req.end_time.is_some() {
            self.end_time = req.end_time;
        }
        if req.start_date.is_some() {
            self.start_date = req.start_date;
        }
        if req.end_date.is_some() {
            self.end_date = req.end_date;
        }
        if req.min_km.is_some() {
            self.min_km = req.min_km;
        }
        if req.max_km.is_some() {
            self.max_km = req.max_km;
        }
        if let Some(high_demand) = req.high_demand {
            self.high_demand = high_demand;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateRequest {
    pub code: Option<String>,
    pub base_price: Option<i64>,
    pub price_per_km: Option<i64>,
    pub price_per_min: Option<i64>,
    pub price_per_passenger: Option<i64>,
    pub price_per_baggage: Option<i64>,
    pub price_per_carry_pet: Option<i64>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub min_km: Option<u32>,
    pub max_km: Option<u32>,
    pub high_demand: Option<bool>,
}

/// Multiplier turning the base trip price into a per-category quote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleCategoryRate {
    pub id: String,
    pub category: VehicleCategory,
    pub factor: f64,
}

impl VehicleCategoryRate {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.factor.is_finite() || self.factor <= 0.0 {
            return Err(AppError::InvalidInput("factor must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleCategoryRateRequest {
    pub category: Option<VehicleCategory>,
    pub factor: Option<f64>,
}
