use async_trait::async_trait;

use crate::error::AppError;
use crate::models::trip::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Average urban speed assumed by the fallback estimator.
const ASSUMED_SPEED_KMH: f64 = 40.0;

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

/// Point `fraction` of the way from `a` to `b`, linear in lat/lng. Good
/// enough for trip-scale distances where the chord is short.
pub fn interpolate(a: &GeoPoint, b: &GeoPoint, fraction: f64) -> GeoPoint {
    let f = fraction.clamp(0.0, 1.0);
    GeoPoint {
        lat: a.lat + (b.lat - a.lat) * f,
        lng: a.lng + (b.lng - a.lng) * f,
    }
}

/// Initial bearing from `a` to `b` in degrees, normalized to [0, 360).
pub fn bearing_deg(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let y = delta_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lng.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

#[derive(Debug, Clone)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_min: f64,
    pub waypoints: Vec<GeoPoint>,
}

/// Mapping-provider seam. The default implementation below approximates;
/// a production deployment swaps in a real directions API client.
#[async_trait]
pub trait RouteEstimator: Send + Sync {
    async fn estimate(&self, from: &GeoPoint, to: &GeoPoint) -> Result<RouteEstimate, AppError>;
}

pub struct HaversineEstimator {
    pub waypoint_count: usize,
}

impl Default for HaversineEstimator {
    fn default() -> Self {
        Self { waypoint_count: 8 }
    }
}

#[async_trait]
impl RouteEstimator for HaversineEstimator {
    async fn estimate(&self, from: &GeoPoint, to: &GeoPoint) -> Result<RouteEstimate, AppError> {
        let distance_km = haversine_km(from, to);
        let duration_min = distance_km / ASSUMED_SPEED_KMH * 60.0;

        let waypoints = (0..=self.waypoint_count)
            .map(|i| interpolate(from, to, i as f64 / self.waypoint_count as f64))
            .collect();

        Ok(RouteEstimate {
            distance_km,
            duration_min,
            waypoints,
        })
    }
}
