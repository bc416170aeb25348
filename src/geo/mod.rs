use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::driver::{GeoPoint, NearbyDriver};

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Geospatial store of driver positions. Most recent write wins.
#[async_trait]
pub trait GeoIndex: Send + Sync {
    async fn upsert(&self, driver_id: &str, location: GeoPoint) -> Result<(), AppError>;

    async fn remove(&self, driver_id: &str) -> Result<(), AppError>;

    /// Forgets positions that are too old to dispatch against.
    async fn evict_stale(&self) -> Result<usize, AppError>;

    /// Drivers within `radius_km` of `point`, nearest first, at most `limit`.
    async fn nearby(
        &self,
        point: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<NearbyDriver>, AppError>;
}

struct Position {
    location: GeoPoint,
    seen_at: Instant,
}

/// Process-local index. Positions older than `ttl` are treated as gone.
pub struct InMemoryGeoIndex {
    positions: DashMap<String, Position>,
    ttl: Duration,
}

impl InMemoryGeoIndex {
    pub fn new(ttl: Duration) -> Self {
        Self {
            positions: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[async_trait]
impl GeoIndex for InMemoryGeoIndex {
    async fn upsert(&self, driver_id: &str, location: GeoPoint) -> Result<(), AppError> {
        if !location.is_valid() {
            return Err(AppError::InvalidInput(format!(
                "location {},{} is out of range",
                location.lat, location.lng
            )));
        }

        self.positions.insert(
            driver_id.to_string(),
            Position {
                location,
                seen_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn remove(&self, driver_id: &str) -> Result<(), AppError> {
        self.positions.remove(driver_id);
        Ok(())
    }

    async fn evict_stale(&self) -> Result<usize, AppError> {
        let before = self.positions.len();
        self.positions
            .retain(|_, position| position.seen_at.elapsed() <= self.ttl);
        Ok(before.saturating_sub(self.positions.len()))
    }

    async fn nearby(
        &self,
        point: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<NearbyDriver>, AppError> {
        let mut drivers: Vec<NearbyDriver> = self
            .positions
            .iter()
            .filter(|entry| entry.value().seen_at.elapsed() <= self.ttl)
            .filter_map(|entry| {
                let location = entry.value().location;
                let distance_km = haversine_km(point, &location);
                (distance_km <= radius_km).then(|| NearbyDriver {
                    driver_id: entry.key().clone(),
                    location,
                    distance_km,
                })
            })
            .collect();

        drivers.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        drivers.truncate(limit);
        Ok(drivers)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{haversine_km, GeoIndex, InMemoryGeoIndex};
    use crate::models::driver::GeoPoint;

    const HAVANA: GeoPoint = GeoPoint {
        lat: 23.1136,
        lng: -82.3666,
    };

    #[test]
    fn zero_distance_for_same_point() {
        let distance = haversine_km(&HAVANA, &HAVANA);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[tokio::test]
    async fn nearby_is_sorted_capped_and_bounded_by_radius() {
        let index = InMemoryGeoIndex::new(Duration::from_secs(60));
        index
            .upsert("far", GeoPoint { lat: 23.1500, lng: -82.3666 })
            .await
            .unwrap();
        index
            .upsert("near", GeoPoint { lat: 23.1140, lng: -82.3666 })
            .await
            .unwrap();
        index
            .upsert("mid", GeoPoint { lat: 23.1200, lng: -82.3666 })
            .await
            .unwrap();
        index
            .upsert("other-city", GeoPoint { lat: 20.0200, lng: -75.8300 })
            .await
            .unwrap();

        let all = index.nearby(&HAVANA, 10.0, 10).await.unwrap();
        let ids: Vec<_> = all.iter().map(|d| d.driver_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);

        let capped = index.nearby(&HAVANA, 10.0, 2).await.unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].driver_id, "near");
    }

    #[tokio::test]
    async fn latest_position_wins() {
        let index = InMemoryGeoIndex::new(Duration::from_secs(60));
        index
            .upsert("d1", GeoPoint { lat: 20.0, lng: -75.0 })
            .await
            .unwrap();
        index.upsert("d1", HAVANA).await.unwrap();

        let found = index.nearby(&HAVANA, 1.0, 5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].location, HAVANA);
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn stale_positions_are_ignored_and_evicted() {
        let index = InMemoryGeoIndex::new(Duration::ZERO);
        index.upsert("d1", HAVANA).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(index.nearby(&HAVANA, 1.0, 5).await.unwrap().is_empty());
        assert_eq!(index.evict_stale().await.unwrap(), 1);
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn rejects_out_of_range_coordinates() {
        let index = InMemoryGeoIndex::new(Duration::from_secs(60));
        let result = index.upsert("d1", GeoPoint { lat: 120.0, lng: 0.0 }).await;
        assert!(result.is_err());
    }
}
