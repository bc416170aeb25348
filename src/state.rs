use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::bus::{Broker, InMemoryBroker, Subscription, ORDERS_CHANNEL, ORDER_ACCEPTED_CHANNEL};
use crate::collaborators::{Directions, Notifier, UserDirectory};
use crate::config::Config;
use crate::engine::dispatch::{run_accepted_notifier, run_order_dispatch, DispatchWorker};
use crate::engine::ingest::{
    run_availability_ingest, run_location_ingest, DriverFeed, DriverFeedReceivers,
};
use crate::engine::lifecycle::OrderService;
use crate::engine::lock::OrderLocks;
use crate::engine::shutdown::Shutdown;
use crate::error::AppError;
use crate::geo::{GeoIndex, InMemoryGeoIndex};
use crate::models::currency::Currency;
use crate::observability::metrics::Metrics;
use crate::store::catalog::RateCatalog;
use crate::store::InMemoryOrderRepository;

/// Adapters for the services this process does not own.
pub struct Collaborators {
    pub directions: Arc<dyn Directions>,
    pub users: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct AppState {
    pub orders: OrderService,
    pub catalog: Arc<RateCatalog>,
    pub geo: Arc<dyn GeoIndex>,
    pub broker: Arc<dyn Broker>,
    pub users: Arc<dyn UserDirectory>,
    pub feed: DriverFeed,
    pub metrics: Metrics,
    pub dispatch_radius_km: f64,
    pub dispatch_limit: usize,
}

/// Everything the background loops consume, created together with the state
/// so no published message is missed before the loops start.
pub struct BackgroundTasks {
    worker: Arc<DispatchWorker>,
    geo: Arc<dyn GeoIndex>,
    users: Arc<dyn UserDirectory>,
    metrics: Metrics,
    orders: Subscription,
    accepted: Subscription,
    feed: DriverFeedReceivers,
    evict_every: Duration,
}

impl AppState {
    pub fn new(
        config: &Config,
        collaborators: Collaborators,
    ) -> Result<(Self, BackgroundTasks), AppError> {
        let default_currency: Currency = config.default_currency.parse()?;
        let metrics = Metrics::new();

        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new(config.event_buffer_size));
        let geo: Arc<dyn GeoIndex> =
            Arc::new(InMemoryGeoIndex::new(config.driver_location_ttl()));
        let catalog = Arc::new(RateCatalog::new());
        let (feed, feed_receivers) =
            DriverFeed::channel(config.location_queue_size, config.availability_queue_size);

        let (backoff, max_backoff) = config.lock_backoff();
        let orders = OrderService::new(
            Arc::new(InMemoryOrderRepository::new()),
            catalog.clone(),
            collaborators.directions,
            broker.clone(),
            metrics.clone(),
            default_currency,
        )
        .with_locks(OrderLocks::new(backoff, max_backoff));

        let worker = Arc::new(DispatchWorker::new(
            geo.clone(),
            collaborators.users.clone(),
            collaborators.notifier,
            metrics.clone(),
            config.dispatch_radius_km,
            config.dispatch_limit,
        ));

        let background = BackgroundTasks {
            worker,
            geo: geo.clone(),
            users: collaborators.users.clone(),
            metrics: metrics.clone(),
            orders: broker.subscribe(ORDERS_CHANNEL),
            accepted: broker.subscribe(ORDER_ACCEPTED_CHANNEL),
            feed: feed_receivers,
            evict_every: config.driver_location_ttl() / 2,
        };

        let state = Self {
            orders,
            catalog,
            geo,
            broker,
            users: collaborators.users,
            feed,
            metrics,
            dispatch_radius_km: config.dispatch_radius_km,
            dispatch_limit: config.dispatch_limit,
        };

        Ok((state, background))
    }
}

impl BackgroundTasks {
    /// Starts one task per loop. Each ends when `shutdown` fires.
    pub fn spawn(self, shutdown: Shutdown) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(run_order_dispatch(
                self.worker.clone(),
                self.orders,
                shutdown.clone(),
            )),
            tokio::spawn(run_accepted_notifier(
                self.worker,
                self.accepted,
                shutdown.clone(),
            )),
            tokio::spawn(run_location_ingest(
                self.geo.clone(),
                self.metrics,
                self.feed.locations,
                self.evict_every,
                shutdown.clone(),
            )),
            tokio::spawn(run_availability_ingest(
                self.users,
                self.geo,
                self.feed.availability,
                shutdown,
            )),
        ]
    }
}
