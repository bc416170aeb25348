use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::error::AppError;
use crate::models::order::{CategoryPrice, Order};
use crate::models::rate::{Rate, VehicleCategoryRate};

/// Flat extras charged on top of the distance/time price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOns {
    pub baggage: bool,
    pub carry_pet: bool,
}

/// First rate whose date and time-of-day windows both contain `now`, or the
/// first rate in the catalog when none is active.
///
/// Windows are inclusive at both ends. A time window whose start is after its
/// end wraps past midnight.
pub fn select_rate(rates: &[Rate], now: DateTime<Utc>) -> Result<&Rate, AppError> {
    if rates.is_empty() {
        return Err(AppError::NotFound("rate catalog is empty".to_string()));
    }

    let today = now.date_naive();
    let time = now.time();

    let active = rates.iter().find(|rate| {
        date_window_contains(rate.start_date, rate.end_date, today)
            && time_window_contains(rate.start_time, rate.end_time, time)
    });

    Ok(active.unwrap_or(&rates[0]))
}

fn date_window_contains(start: Option<NaiveDate>, end: Option<NaiveDate>, day: NaiveDate) -> bool {
    start.is_none_or(|start| day >= start) && end.is_none_or(|end| day <= end)
}

fn time_window_contains(start: Option<NaiveTime>, end: Option<NaiveTime>, time: NaiveTime) -> bool {
    match (start, end) {
        (Some(start), Some(end)) if start <= end => time >= start && time <= end,
        (Some(start), Some(end)) => time >= start || time <= end,
        (Some(start), None) => time >= start,
        (None, Some(end)) => time <= end,
        (None, None) => true,
    }
}

/// Base trip price in minor units before any category factor.
pub fn price(distance_m: f64, duration_s: f64, rate: &Rate, riders: u32, add_ons: AddOns) -> f64 {
    let mut total = rate.base_price as f64
        + rate.price_per_km as f64 * (distance_m / 1000.0)
        + rate.price_per_min as f64 * (duration_s / 60.0)
        + rate.price_per_passenger as f64 * riders as f64;

    if add_ons.baggage {
        total += rate.price_per_baggage as f64;
    }
    if add_ons.carry_pet {
        total += rate.price_per_carry_pet as f64;
    }

    total
}

/// One quote per registered vehicle category.
pub fn quote(order: &Order, rate: &Rate, categories: &[VehicleCategoryRate]) -> Vec<CategoryPrice> {
    let add_ons = AddOns {
        baggage: order.item.baggages,
        carry_pet: order.item.carry_pet,
    };
    let base = price(order.distance, order.duration, rate, order.item.riders, add_ons);

    categories
        .iter()
        .map(|category| CategoryPrice {
            category: category.category,
            price: (base * category.factor).round() as i64,
            currency: order.currency.clone(),
        })
        .collect()
}
