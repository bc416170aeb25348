use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use ulid::Ulid;

use crate::auth::{Caller, Role};
use crate::bus::{publish_json, Broker, ORDERS_CHANNEL, ORDER_ACCEPTED_CHANNEL};
use crate::collaborators::Directions;
use crate::engine::lock::OrderLocks;
use crate::engine::pricing::quote;
use crate::error::AppError;
use crate::models::currency::Currency;
use crate::models::order::{
    CategoryPrice, ConfirmOrder, Item, Order, OrderFilter, OrderList, OrderStatus,
};
use crate::observability::metrics::Metrics;
use crate::store::catalog::RateCatalog;
use crate::store::OrderRepository;

const MAX_RATING: f64 = 5.0;

/// Owns the order aggregate and every state change applied to it.
///
/// Each mutating operation holds the per-order lock from the first read to
/// the last write, so two operations on the same order never interleave.
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<RateCatalog>,
    directions: Arc<dyn Directions>,
    broker: Arc<dyn Broker>,
    locks: OrderLocks,
    metrics: Metrics,
    default_currency: Currency,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<RateCatalog>,
        directions: Arc<dyn Directions>,
        broker: Arc<dyn Broker>,
        metrics: Metrics,
        default_currency: Currency,
    ) -> Self {
        Self {
            orders,
            catalog,
            directions,
            broker,
            locks: OrderLocks::default(),
            metrics,
            default_currency,
        }
    }

    pub fn with_locks(mut self, locks: OrderLocks) -> Self {
        self.locks = locks;
        self
    }

    pub async fn create(&self, caller: &Caller, item: Item) -> Result<Order, AppError> {
        caller.require(Role::Rider)?;
        item.validate()?;

        let currency = Currency::parse_or(&item.currency, &self.default_currency)?;
        let mut order = Order::new(
            Ulid::new().to_string(),
            caller.id.clone(),
            normalize_item(item, &currency),
            currency.to_string(),
        );
        self.price_route(&mut order).await?;

        self.orders.insert(&order).await?;
        self.record_transition(order.status);

        info!(
            order_id = %order.id,
            rider_id = %order.rider,
            distance_m = order.distance,
            quotes = order.category_price.len(),
            "order created"
        );
        Ok(order)
    }

    /// Re-routes and re-quotes an order the rider has not confirmed yet.
    pub async fn update(&self, caller: &Caller, id: &str, item: Item) -> Result<Order, AppError> {
        caller.require(Role::Rider)?;
        item.validate()?;

        let _lock = self.locks.acquire(id).await;
        let mut order = self.load_visible(caller, id).await?;
        if order.status != OrderStatus::New {
            return Err(AppError::InvalidInput(format!(
                "order {id} is {} and can no longer be changed",
                order.status
            )));
        }

        let current = Currency::parse_or(&order.currency, &self.default_currency)?;
        let currency = Currency::parse_or(&item.currency, &current)?;
        order.item = normalize_item(item, &currency);
        order.currency = currency.to_string();
        self.price_route(&mut order).await?;
        order.updated_at = Utc::now();

        self.orders.update(&order).await?;
        info!(order_id = %order.id, "order re-quoted");
        Ok(order)
    }

    pub async fn find_by_id(&self, caller: &Caller, id: &str) -> Result<Order, AppError> {
        self.load_visible(caller, id).await
    }

    /// Lists orders, narrowed to what the caller's role may see.
    pub async fn find_all(
        &self,
        caller: &Caller,
        mut filter: OrderFilter,
    ) -> Result<OrderList, AppError> {
        match caller.role {
            Role::Rider => filter.rider = Some(caller.id.clone()),
            Role::Driver => filter.driver = Some(caller.id.clone()),
            Role::Admin => {}
        }

        self.orders.find_all(&filter).await
    }

    pub async fn confirm_order(
        &self,
        caller: &Caller,
        id: &str,
        req: ConfirmOrder,
    ) -> Result<(), AppError> {
        caller.require(Role::Rider)?;

        let _lock = self.locks.acquire(id).await;
        let mut order = self.load_visible(caller, id).await?;
        if order.rider != caller.id {
            return Err(AppError::AccessDenied(format!(
                "order {id} belongs to another rider"
            )));
        }
        if order.status != OrderStatus::New {
            return Err(AppError::NotFound(format!(
                "order {id} is not awaiting confirmation"
            )));
        }

        let selected = order.quote_for(req.category).cloned().ok_or_else(|| {
            AppError::NotFound(format!("order {id} has no quote for {:?}", req.category))
        })?;

        order.transition(OrderStatus::Confirmed)?;
        order.price = Some(selected.price);
        order.selected_category = Some(selected);
        order.charge_method = Some(req.method);

        self.orders.update(&order).await?;
        self.record_transition(order.status);
        publish_json(self.broker.as_ref(), &self.metrics, ORDERS_CHANNEL, &order).await?;

        info!(
            order_id = %order.id,
            category = ?req.category,
            method = %req.method,
            "order confirmed"
        );
        Ok(())
    }

    pub async fn accept_order(&self, caller: &Caller, id: &str) -> Result<(), AppError> {
        caller.require(Role::Driver)?;

        let _lock = self.locks.acquire(id).await;
        // Not filtered by visibility: a driver who lost the race must learn
        // that the order was taken, not that it vanished.
        let mut order = self
            .orders
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        if order.driver.is_some() {
            return Err(AppError::OrderAccepted);
        }
        if order.is_banned(&caller.id) {
            return Err(AppError::AccessDenied(format!(
                "driver {} may not take order {id}",
                caller.id
            )));
        }

        order.transition(OrderStatus::OnTheWay)?;
        order.driver = Some(caller.id.clone());

        self.orders.update(&order).await?;
        self.record_transition(order.status);
        publish_json(
            self.broker.as_ref(),
            &self.metrics,
            ORDER_ACCEPTED_CHANNEL,
            &order,
        )
        .await?;

        info!(order_id = %order.id, driver_id = %caller.id, "order accepted");
        Ok(())
    }

    pub async fn start_order(&self, caller: &Caller, id: &str) -> Result<(), AppError> {
        caller.require(Role::Driver)?;

        let _lock = self.locks.acquire(id).await;
        let mut order = self.load_visible(caller, id).await?;
        ensure_assigned(&order, caller)?;

        order.transition(OrderStatus::PickedUp)?;
        order.start_at = Some(Utc::now());

        self.orders.update(&order).await?;
        self.record_transition(order.status);
        info!(order_id = %order.id, driver_id = %caller.id, "rider picked up");
        Ok(())
    }

    pub async fn finish_order(&self, caller: &Caller, id: &str) -> Result<(), AppError> {
        caller.require_any(&[Role::Driver, Role::Admin])?;

        let _lock = self.locks.acquire(id).await;
        let mut order = self.load_visible(caller, id).await?;
        if caller.role == Role::Driver {
            ensure_assigned(&order, caller)?;
        }

        // TODO: capture the charge and store its id once a payment processor is wired in.
        match order.charge_method {
            Some(method) if method.is_supported() => {}
            Some(method) => return Err(AppError::UnsupportedChargeMethod(method)),
            None => {
                return Err(AppError::InvalidInput(format!(
                    "order {id} has no charge method"
                )));
            }
        }

        order.transition(OrderStatus::DroppedOff)?;
        order.end_at = Some(Utc::now());

        self.orders.update(&order).await?;
        self.record_transition(order.status);
        info!(order_id = %order.id, price = ?order.price, "trip finished");
        Ok(())
    }

    /// A cancel by the assigned driver hands the order back to dispatch
    /// without that driver; an admin cancel ends it.
    pub async fn cancel_order(&self, caller: &Caller, id: &str) -> Result<(), AppError> {
        caller.require_any(&[Role::Driver, Role::Admin])?;

        let _lock = self.locks.acquire(id).await;
        let mut order = self.load_visible(caller, id).await?;
        if order.status.is_terminal() {
            return Err(AppError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Canceled,
            });
        }

        match caller.role {
            Role::Driver => {
                ensure_assigned(&order, caller)?;
                order.transition(OrderStatus::WaitingDriver)?;
                order.ban_driver(&caller.id);
                order.driver = None;

                self.orders.update(&order).await?;
                self.record_transition(order.status);
                publish_json(self.broker.as_ref(), &self.metrics, ORDERS_CHANNEL, &order)
                    .await?;

                info!(
                    order_id = %order.id,
                    driver_id = %caller.id,
                    "driver dropped order; re-dispatching"
                );
            }
            _ => {
                order.transition(OrderStatus::Canceled)?;
                order.driver = None;

                self.orders.update(&order).await?;
                self.record_transition(order.status);
                info!(order_id = %order.id, admin_id = %caller.id, "order canceled");
            }
        }

        Ok(())
    }

    pub async fn rate_order(
        &self,
        caller: &Caller,
        id: &str,
        rating: f64,
        comment: String,
    ) -> Result<(), AppError> {
        caller.require(Role::Rider)?;
        if !(0.0..=MAX_RATING).contains(&rating) {
            return Err(AppError::InvalidInput(format!(
                "rating must be between 0 and {MAX_RATING}"
            )));
        }

        let _lock = self.locks.acquire(id).await;
        let mut order = self.load_visible(caller, id).await?;
        if order.rider != caller.id {
            return Err(AppError::AccessDenied(format!(
                "order {id} belongs to another rider"
            )));
        }

        order.rating = Some(rating);
        order.review = Some(comment);
        order.updated_at = Utc::now();

        self.orders.update(&order).await?;
        info!(order_id = %order.id, rating, "order rated");
        Ok(())
    }

    pub async fn categories(
        &self,
        caller: &Caller,
        id: &str,
    ) -> Result<Vec<CategoryPrice>, AppError> {
        Ok(self.load_visible(caller, id).await?.category_price)
    }

    async fn load_visible(&self, caller: &Caller, id: &str) -> Result<Order, AppError> {
        self.orders
            .find_by_id(id)
            .await?
            .filter(|order| can_view(caller, order))
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    async fn price_route(&self, order: &mut Order) -> Result<(), AppError> {
        let directions = self.directions.get_route(&order.item.points).await?;
        let route = directions.routes.into_iter().next().ok_or_else(|| {
            AppError::NotFound("no route found between the requested points".to_string())
        })?;

        order.distance = directions.distance;
        order.duration = directions.duration;
        order.route = Some(route);
        order.route_string = base64::encode(directions.raw_body.as_bytes());

        let rate = self.catalog.active_rate(Utc::now()).await?;
        let categories = self.catalog.category_rates().await;
        if categories.is_empty() {
            return Err(AppError::NotFound(
                "no vehicle category rates registered".to_string(),
            ));
        }

        order.category_price = quote(order, &rate, &categories);
        Ok(())
    }

    fn record_transition(&self, status: OrderStatus) {
        self.metrics
            .order_transitions_total
            .with_label_values(&[&status.to_string()])
            .inc();
    }
}

fn normalize_item(mut item: Item, currency: &Currency) -> Item {
    item.riders = item.riders.max(1);
    item.currency = currency.to_string();
    item
}

fn can_view(caller: &Caller, order: &Order) -> bool {
    match caller.role {
        Role::Admin => true,
        Role::Rider => order.rider == caller.id,
        Role::Driver => {
            order.is_assigned_to(&caller.id)
                || (order.driver.is_none()
                    && order.status.is_dispatchable()
                    && !order.is_banned(&caller.id))
        }
    }
}

fn ensure_assigned(order: &Order, caller: &Caller) -> Result<(), AppError> {
    if order.is_assigned_to(&caller.id) {
        Ok(())
    } else {
        Err(AppError::AccessDenied(format!(
            "driver {} is not assigned to order {}",
            caller.id, order.id
        )))
    }
}
