use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    DriverAssigned,
    DriverEnRoute,
    Arrived,
    PassengerOnboard,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    pub heading_deg: f64,
    pub speed_kmh: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub pickup: GeoPoint,
    pub pickup_address: String,
    pub dropoff: GeoPoint,
    pub dropoff_address: String,
    pub waypoints: Vec<GeoPoint>,
    pub total_distance_km: f64,
    pub total_duration_min: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTrip {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub tenant_id: Uuid,
    pub requester_id: Uuid,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub status: TripStatus,
    pub route: Route,
    pub current_location: Position,
    /// Route completion percentage, clamped to [0, 100], never decreasing
    /// while the trip is live.
    pub progress: f64,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
