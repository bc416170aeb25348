use std::sync::Arc;
use std::time::Instant;

use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::auth::Role;
use crate::bus::Subscription;
use crate::collaborators::{Notifier, UserDirectory};
use crate::engine::shutdown::Shutdown;
use crate::error::AppError;
use crate::geo::GeoIndex;
use crate::models::driver::OrderNotification;
use crate::models::order::Order;
use crate::observability::metrics::Metrics;

/// Finds drivers for published orders and tells riders when one accepts.
pub struct DispatchWorker {
    geo: Arc<dyn GeoIndex>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
    radius_km: f64,
    limit: usize,
}

impl DispatchWorker {
    pub fn new(
        geo: Arc<dyn GeoIndex>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        metrics: Metrics,
        radius_km: f64,
        limit: usize,
    ) -> Self {
        Self {
            geo,
            users,
            notifier,
            metrics,
            radius_km,
            limit,
        }
    }

    /// Notifies the nearby, non-banned drivers of `order`. Returns how many
    /// drivers were addressed.
    pub async fn dispatch(&self, order: &Order) -> Result<usize, AppError> {
        let pickup = order.item.pickup().ok_or_else(|| {
            AppError::InvalidInput(format!("order {} has no pickup point", order.id))
        })?;

        let candidates: Vec<String> = self
            .geo
            .nearby(pickup, self.radius_km, self.limit)
            .await?
            .into_iter()
            .filter(|driver| !order.is_banned(&driver.driver_id))
            .map(|driver| driver.driver_id)
            .collect();

        if candidates.is_empty() {
            return Err(AppError::NoAvailableDrivers);
        }

        let devices = self
            .users
            .get_user_devices(&candidates, Role::Driver)
            .await?;
        if devices.is_empty() {
            return Err(AppError::NoDevices);
        }

        self.notifier
            .notify_to_devices(&devices, &OrderNotification::from(order))
            .await?;

        Ok(candidates.len())
    }

    pub async fn announce_accepted(&self, order: &Order) -> Result<(), AppError> {
        let devices = self
            .users
            .get_user_devices(std::slice::from_ref(&order.rider), Role::Rider)
            .await?;
        if devices.is_empty() {
            return Err(AppError::NoDevices);
        }

        self.notifier
            .notify_rider_order_accepted(&devices, &OrderNotification::from(order))
            .await
    }

    fn record(&self, outcome: &str, started: Instant) {
        self.metrics
            .dispatch_total
            .with_label_values(&[outcome])
            .inc();
        self.metrics
            .dispatch_latency_seconds
            .with_label_values(&[outcome])
            .observe(started.elapsed().as_secs_f64());
    }
}

/// Consumes the `orders` channel until shutdown. A failed dispatch is logged
/// and never stops the loop.
pub async fn run_order_dispatch(
    worker: Arc<DispatchWorker>,
    mut orders: Subscription,
    mut shutdown: Shutdown,
) {
    info!("dispatch worker started");

    loop {
        let payload = tokio::select! {
            _ = shutdown.wait() => break,
            message = orders.next() => match message {
                Some(payload) => payload,
                None => {
                    warn!("dispatch worker stopped: orders channel closed");
                    return;
                }
            },
        };

        let started = Instant::now();
        let order = match serde_json::from_str::<Order>(&payload) {
            Ok(order) => order,
            Err(err) => {
                worker.record("invalid", started);
                warn!(error = %err, "discarding undecodable order message");
                continue;
            }
        };

        if !order.status.is_dispatchable() || order.driver.is_some() {
            debug!(order_id = %order.id, status = %order.status, "order no longer needs a driver");
            continue;
        }

        match worker.dispatch(&order).await {
            Ok(notified) => {
                worker.record("notified", started);
                info!(order_id = %order.id, drivers = notified, "drivers notified");
            }
            Err(AppError::NoAvailableDrivers) => {
                worker.record("no_drivers", started);
                warn!(order_id = %order.id, "no drivers near pickup");
            }
            Err(AppError::NoDevices) => {
                worker.record("no_devices", started);
                warn!(order_id = %order.id, "nearby drivers have no registered devices");
            }
            Err(err) => {
                worker.record("error", started);
                error!(order_id = %order.id, error = %err, "failed to dispatch order");
            }
        }
    }

    info!("dispatch worker stopped");
}

pub async fn run_accepted_notifier(
    worker: Arc<DispatchWorker>,
    mut accepted: Subscription,
    mut shutdown: Shutdown,
) {
    info!("acceptance notifier started");

    loop {
        let payload = tokio::select! {
            _ = shutdown.wait() => break,
            message = accepted.next() => match message {
                Some(payload) => payload,
                None => {
                    warn!("acceptance notifier stopped: channel closed");
                    return;
                }
            },
        };

        let order = match serde_json::from_str::<Order>(&payload) {
            Ok(order) => order,
            Err(err) => {
                warn!(error = %err, "discarding undecodable acceptance message");
                continue;
            }
        };

        if let Err(err) = worker.announce_accepted(&order).await {
            warn!(
                order_id = %order.id,
                rider_id = %order.rider,
                error = %err,
                "failed to notify rider"
            );
        }
    }

    info!("acceptance notifier stopped");
}
