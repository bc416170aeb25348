use async_trait::async_trait;
use serde_json::json;

use crate::collaborators::{Directions, DirectionsResponse};
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::driver::GeoPoint;
use crate::models::order::Route;

/// Straight-line route estimate for running without a directions provider.
pub struct EstimatedDirections {
    average_speed_kmh: f64,
}

impl EstimatedDirections {
    pub fn new(average_speed_kmh: f64) -> Self {
        Self { average_speed_kmh }
    }
}

#[async_trait]
impl Directions for EstimatedDirections {
    async fn get_route(&self, points: &[GeoPoint]) -> Result<DirectionsResponse, AppError> {
        if points.len() < 2 {
            return Ok(DirectionsResponse::default());
        }

        let distance_km: f64 = points
            .windows(2)
            .map(|leg| haversine_km(&leg[0], &leg[1]))
            .sum();
        let distance = distance_km * 1000.0;
        let duration = distance_km / self.average_speed_kmh * 3600.0;

        let geometry = points
            .iter()
            .map(|point| format!("{:.6},{:.6}", point.lng, point.lat))
            .collect::<Vec<_>>()
            .join(";");

        let raw_body = json!({
            "code": "Ok",
            "routes": [{
                "distance": distance,
                "duration": duration,
                "geometry": geometry,
            }],
        })
        .to_string();

        Ok(DirectionsResponse {
            distance,
            duration,
            routes: vec![Route {
                distance,
                duration,
                geometry,
            }],
            raw_body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sums_legs_and_derives_duration_from_speed() {
        let directions = EstimatedDirections::new(36.0);
        let points = [
            GeoPoint { lat: 0.0, lng: 0.0 },
            GeoPoint { lat: 0.0, lng: 0.01 },
            GeoPoint { lat: 0.0, lng: 0.02 },
        ];

        let response = directions.get_route(&points).await.unwrap();

        let expected_m = haversine_km(&points[0], &points[2]) * 1000.0;
        assert!((response.distance - expected_m).abs() < 1.0);
        // 36 km/h is 10 m/s.
        assert!((response.duration - response.distance / 10.0).abs() < 1e-6);
        assert_eq!(response.routes.len(), 1);
        assert!(response.raw_body.contains("\"routes\""));
    }

    #[tokio::test]
    async fn single_point_has_no_route() {
        let directions = EstimatedDirections::new(30.0);
        let response = directions
            .get_route(&[GeoPoint { lat: 1.0, lng: 1.0 }])
            .await
            .unwrap();
        assert!(response.routes.is_empty());
    }
}
