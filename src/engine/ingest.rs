use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::collaborators::UserDirectory;
use crate::engine::shutdown::Shutdown;
use crate::error::AppError;
use crate::geo::GeoIndex;
use crate::models::driver::{AvailabilityUpdate, DriverLocation};
use crate::observability::metrics::Metrics;

/// Producer side of the driver report queues.
#[derive(Clone)]
pub struct DriverFeed {
    location_tx: mpsc::Sender<DriverLocation>,
    availability_tx: mpsc::Sender<AvailabilityUpdate>,
}

pub struct DriverFeedReceivers {
    pub locations: mpsc::Receiver<DriverLocation>,
    pub availability: mpsc::Receiver<AvailabilityUpdate>,
}

impl DriverFeed {
    pub fn channel(
        location_capacity: usize,
        availability_capacity: usize,
    ) -> (Self, DriverFeedReceivers) {
        let (location_tx, locations) = mpsc::channel(location_capacity.max(1));
        let (availability_tx, availability) = mpsc::channel(availability_capacity.max(1));

        (
            Self {
                location_tx,
                availability_tx,
            },
            DriverFeedReceivers {
                locations,
                availability,
            },
        )
    }

    pub async fn push_location(&self, report: DriverLocation) -> Result<(), AppError> {
        if report.driver_id.is_empty() {
            return Err(AppError::InvalidInput("driver_id is required".to_string()));
        }
        if !report.point().is_valid() {
            return Err(AppError::InvalidInput(format!(
                "location {},{} is out of range",
                report.lat, report.lng
            )));
        }

        self.location_tx
            .send(report)
            .await
            .map_err(|err| AppError::Internal(format!("location queue send failed: {err}")))
    }

    pub async fn push_availability(&self, update: AvailabilityUpdate) -> Result<(), AppError> {
        if update.driver_id.is_empty() {
            return Err(AppError::InvalidInput("driver_id is required".to_string()));
        }

        self.availability_tx
            .send(update)
            .await
            .map_err(|err| AppError::Internal(format!("availability queue send failed: {err}")))
    }
}

/// Writes location reports into the geo index and periodically drops
/// positions that stopped reporting.
pub async fn run_location_ingest(
    geo: Arc<dyn GeoIndex>,
    metrics: Metrics,
    mut reports: mpsc::Receiver<DriverLocation>,
    evict_every: Duration,
    mut shutdown: Shutdown,
) {
    info!("location ingest started");

    let mut eviction = tokio::time::interval(evict_every.max(Duration::from_secs(1)));
    eviction.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = eviction.tick() => match geo.evict_stale().await {
                Ok(0) => {}
                Ok(evicted) => debug!(evicted, "stale driver positions evicted"),
                Err(err) => warn!(error = %err, "failed to evict stale positions"),
            },
            report = reports.recv() => {
                let Some(report) = report else {
                    warn!("location ingest stopped: queue closed");
                    return;
                };

                match geo.upsert(&report.driver_id, report.point()).await {
                    Ok(()) => metrics
                        .location_updates_total
                        .with_label_values(&["stored"])
                        .inc(),
                    Err(err) => {
                        metrics
                            .location_updates_total
                            .with_label_values(&["rejected"])
                            .inc();
                        warn!(
                            driver_id = %report.driver_id,
                            error = %err,
                            "failed to store location"
                        );
                    }
                }
            }
        }
    }

    info!("location ingest stopped");
}

/// Applies availability toggles. A driver going offline also leaves the geo
/// index so dispatch stops offering them orders.
pub async fn run_availability_ingest(
    users: Arc<dyn UserDirectory>,
    geo: Arc<dyn GeoIndex>,
    mut updates: mpsc::Receiver<AvailabilityUpdate>,
    mut shutdown: Shutdown,
) {
    info!("availability ingest started");

    loop {
        let update = tokio::select! {
            _ = shutdown.wait() => break,
            update = updates.recv() => match update {
                Some(update) => update,
                None => {
                    warn!("availability ingest stopped: queue closed");
                    return;
                }
            },
        };

        if let Err(err) = users
            .set_availability(&update.driver_id, update.available)
            .await
        {
            warn!(driver_id = %update.driver_id, error = %err, "failed to update availability");
            continue;
        }

        if !update.available {
            if let Err(err) = geo.remove(&update.driver_id).await {
                warn!(
                    driver_id = %update.driver_id,
                    error = %err,
                    "failed to drop offline driver position"
                );
            }
        }

        debug!(driver_id = %update.driver_id, available = update.available, "availability updated");
    }

    info!("availability ingest stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::collaborators::users::InMemoryUserDirectory;
    use crate::engine::shutdown;
    use crate::geo::InMemoryGeoIndex;
    use crate::models::driver::GeoPoint;

    const HAVANA: GeoPoint = GeoPoint {
        lat: 23.1136,
        lng: -82.3666,
    };

    async fn eventually<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met in time");
    }

    #[tokio::test]
    async fn feed_rejects_bad_reports() {
        let (feed, _receivers) = DriverFeed::channel(4, 4);
        let bad = DriverLocation {
            driver_id: "d1".into(),
            lat: 120.0,
            lng: 0.0,
        };
        assert!(matches!(
            feed.push_location(bad).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(feed
            .push_availability(AvailabilityUpdate {
                driver_id: String::new(),
                available: true,
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn reports_reach_the_index_and_offline_drivers_leave_it() {
        let geo = Arc::new(InMemoryGeoIndex::new(Duration::from_secs(60)));
        let users = Arc::new(InMemoryUserDirectory::new());
        users.register("d1", Role::Driver, vec!["dev-1".into()]);

        let (feed, receivers) = DriverFeed::channel(16, 16);
        let (trigger, stop) = shutdown::channel();

        let location_task = tokio::spawn(run_location_ingest(
            geo.clone(),
            Metrics::new(),
            receivers.locations,
            Duration::from_secs(30),
            stop.clone(),
        ));
        let availability_task = tokio::spawn(run_availability_ingest(
            users.clone(),
            geo.clone(),
            receivers.availability,
            stop,
        ));

        feed.push_location(DriverLocation {
            driver_id: "d1".into(),
            lat: HAVANA.lat,
            lng: HAVANA.lng,
        })
        .await
        .unwrap();
        eventually(|| geo.len() == 1).await;

        feed.push_availability(AvailabilityUpdate {
            driver_id: "d1".into(),
            available: false,
        })
        .await
        .unwrap();
        eventually(|| geo.is_empty()).await;
        assert!(!users.get("d1").unwrap().available);

        trigger.trigger();
        location_task.await.unwrap();
        availability_task.await.unwrap();
    }
}
