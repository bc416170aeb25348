//! Tariff reference data: rates and per-category multipliers.
//!
//! Read on every quote, written only by administrators.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::auth::{Caller, Role};
use crate::engine::pricing::select_rate;
use crate::error::AppError;
use crate::models::order::VehicleCategory;
use crate::models::rate::{Rate, RateRequest, VehicleCategoryRate, VehicleCategoryRateRequest};

#[derive(Default)]
pub struct RateCatalog {
    // Insertion order matters: the first active rate wins.
    rates: RwLock<Vec<Rate>>,
    categories: RwLock<Vec<VehicleCategoryRate>>,
}

impl RateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_rate(&self, caller: &Caller, req: RateRequest) -> Result<Rate, AppError> {
        caller.require(Role::Admin)?;

        let mut rate = Rate {
            id: Ulid::new().to_string(),
            ..Rate::default()
        };
        rate.apply(req);
        rate.validate()?;

        let mut rates = self.rates.write().await;
        if rates.iter().any(|existing| existing.code == rate.code) {
            return Err(AppError::InvalidInput(format!(
                "rate code {} already exists",
                rate.code
            )));
        }
        rates.push(rate.clone());
        Ok(rate)
    }

    pub async fn update_rate(
        &self,
        caller: &Caller,
        id: &str,
        req: RateRequest,
    ) -> Result<Rate, AppError> {
        caller.require(Role::Admin)?;

        let mut rates = self.rates.write().await;
        let index = rates
            .iter()
            .position(|rate| rate.id == id)
            .ok_or_else(|| AppError::NotFound(format!("rate {id} not found")))?;

        let mut updated = rates[index].clone();
        updated.apply(req);
        updated.validate()?;
        if rates
            .iter()
            .any(|other| other.id != updated.id && other.code == updated.code)
        {
            return Err(AppError::InvalidInput(format!(
                "rate code {} already exists",
                updated.code
            )));
        }

        rates[index] = updated.clone();
        Ok(updated)
    }

    pub async fn find_rate(&self, id: &str) -> Result<Rate, AppError> {
        self.rates
            .read()
            .await
            .iter()
            .find(|rate| rate.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("rate {id} not found")))
    }

    pub async fn find_rate_by_code(&self, caller: &Caller, code: &str) -> Result<Rate, AppError> {
        caller.require(Role::Admin)?;

        self.rates
            .read()
            .await
            .iter()
            .find(|rate| rate.code == code)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("rate {code} not found")))
    }

    pub async fn rates(&self) -> Vec<Rate> {
        self.rates.read().await.clone()
    }

    /// The tariff in force at `now`.
    pub async fn active_rate(&self, now: DateTime<Utc>) -> Result<Rate, AppError> {
        let rates = self.rates.read().await;
        select_rate(&rates, now).cloned()
    }

    pub async fn create_category_rate(
        &self,
        caller: &Caller,
        req: VehicleCategoryRateRequest,
    ) -> Result<VehicleCategoryRate, AppError> {
        caller.require(Role::Admin)?;

        let category = req
            .category
            .ok_or_else(|| AppError::InvalidInput("category is required".to_string()))?;
        let factor = req
            .factor
            .ok_or_else(|| AppError::InvalidInput("factor is required".to_string()))?;

        let rate = VehicleCategoryRate {
            id: Ulid::new().to_string(),
            category,
            factor,
        };
        rate.validate()?;

        let mut categories = self.categories.write().await;
        if categories.iter().any(|existing| existing.category == category) {
            return Err(AppError::InvalidInput(format!(
                "category {category:?} already has a rate"
            )));
        }
        categories.push(rate.clone());
        Ok(rate)
    }

    pub async fn update_category_rate(
        &self,
        caller: &Caller,
        id: &str,
        req: VehicleCategoryRateRequest,
    ) -> Result<VehicleCategoryRate, AppError> {
        caller.require(Role::Admin)?;

        let mut categories = self.categories.write().await;
        let index = categories
            .iter()
            .position(|rate| rate.id == id)
            .ok_or_else(|| AppError::NotFound(format!("category rate {id} not found")))?;

        let mut updated = categories[index].clone();
        if let Some(category) = req.category {
            updated.category = category;
        }
        if let Some(factor) = req.factor {
            updated.factor = factor;
        }
        updated.validate()?;
        if categories
            .iter()
            .any(|other| other.id != updated.id && other.category == updated.category)
        {
            return Err(AppError::InvalidInput(format!(
                "category {:?} already has a rate",
                updated.category
            )));
        }

        categories[index] = updated.clone();
        Ok(updated)
    }

    pub async fn category_rate_by_category(
        &self,
        category: VehicleCategory,
    ) -> Result<VehicleCategoryRate, AppError> {
        self.categories
            .read()
            .await
            .iter()
            .find(|rate| rate.category == category)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("no rate for category {category:?}")))
    }

    pub async fn category_rates(&self) -> Vec<VehicleCategoryRate> {
        self.categories.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_request(code: &str) -> RateRequest {
        RateRequest {
            code: Some(code.to_string()),
            base_price: Some(1000),
            price_per_km: Some(17500),
            ..RateRequest::default()
        }
    }

    #[tokio::test]
    async fn only_admins_write_rates() {
        let catalog = RateCatalog::new();
        let err = catalog
            .create_rate(&Caller::rider("r1"), rate_request("day"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));
        assert!(catalog.rates().await.is_empty());
    }

    #[tokio::test]
    async fn create_validates_and_rejects_duplicate_codes() {
        let catalog = RateCatalog::new();
        let admin = Caller::admin("root");

        let invalid = RateRequest {
            base_price: Some(0),
            ..rate_request("zero")
        };
        assert!(catalog.create_rate(&admin, invalid).await.is_err());

        catalog.create_rate(&admin, rate_request("day")).await.unwrap();
        let dup = catalog.create_rate(&admin, rate_request("day")).await;
        assert!(matches!(dup, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn update_is_partial() {
        let catalog = RateCatalog::new();
        let admin = Caller::admin("root");
        let created = catalog.create_rate(&admin, rate_request("day")).await.unwrap();

        let updated = catalog
            .update_rate(
                &admin,
                &created.id,
                RateRequest {
                    price_per_min: Some(250),
                    ..RateRequest::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.code, "day");
        assert_eq!(updated.base_price, 1000);
        assert_eq!(updated.price_per_min, 250);
        assert_eq!(catalog.find_rate(&created.id).await.unwrap(), updated);
        assert_eq!(
            catalog.find_rate_by_code(&admin, "day").await.unwrap().id,
            created.id
        );
    }

    #[tokio::test]
    async fn one_factor_per_category() {
        let catalog = RateCatalog::new();
        let admin = Caller::admin("root");
        let request = |factor| VehicleCategoryRateRequest {
            category: Some(VehicleCategory::Xl),
            factor: Some(factor),
        };

        let created = catalog.create_category_rate(&admin, request(1.2)).await.unwrap();
        assert!(catalog.create_category_rate(&admin, request(1.5)).await.is_err());
        assert!(catalog
            .create_category_rate(
                &admin,
                VehicleCategoryRateRequest {
                    category: Some(VehicleCategory::X),
                    factor: Some(-1.0),
                },
            )
            .await
            .is_err());

        let updated = catalog
            .update_category_rate(
                &admin,
                &created.id,
                VehicleCategoryRateRequest {
                    category: None,
                    factor: Some(1.4),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.factor, 1.4);
        assert_eq!(
            catalog
                .category_rate_by_category(VehicleCategory::Xl)
                .await
                .unwrap()
                .factor,
            1.4
        );
    }

    #[tokio::test]
    async fn active_rate_falls_back_to_first_rate_outside_every_window() {
        let catalog = RateCatalog::new();
        let admin = Caller::admin("root");
        let expired = |code| RateRequest {
            start_date: chrono::NaiveDate::from_ymd_opt(2020, 1, 1),
            end_date: chrono::NaiveDate::from_ymd_opt(2020, 12, 31),
            ..rate_request(code)
        };
        catalog.create_rate(&admin, expired("legacy")).await.unwrap();
        catalog.create_rate(&admin, expired("promo")).await.unwrap();

        let rate = catalog.active_rate(Utc::now()).await.unwrap();
        assert_eq!(rate.code, "legacy");
    }

    #[tokio::test]
    async fn active_rate_fails_on_empty_catalog() {
        let catalog = RateCatalog::new();
        assert!(matches!(
            catalog.active_rate(Utc::now()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
