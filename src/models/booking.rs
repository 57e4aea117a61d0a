use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::pricing::VehicleCategory;
use crate::models::trip::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    New,
    Sourcing,
    Quoting,
    OperatorAssigned,
    DriverAssigned,
    DriverEnRoute,
    Arrived,
    PassengerOnboard,
    InProgress,
    Completed,
    Billing,
    Paid,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// Forward edges of the lifecycle. Cancellation is handled separately:
    /// legal from any state except `Completed`, `Paid` and `Cancelled`.
    pub fn can_advance_to(&self, target: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, target),
            (New, Sourcing)
                | (Sourcing, Quoting)
                | (Quoting, OperatorAssigned)
                | (OperatorAssigned, DriverAssigned)
                | (DriverAssigned, DriverEnRoute)
                | (DriverEnRoute, Arrived)
                | (Arrived, PassengerOnboard)
                | (PassengerOnboard, InProgress)
                | (InProgress, Completed)
                | (Completed, Billing)
                | (Billing, Paid)
        )
    }

    pub fn can_cancel(&self) -> bool {
        !matches!(self, Self::Completed | Self::Paid | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    PointToPoint,
    HourlyCharter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopDescriptor {
    pub address: String,
    pub coordinates: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripSpec {
    pub service_type: ServiceType,
    pub pickup: StopDescriptor,
    pub dropoff: Option<StopDescriptor>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_hours: Option<f64>,
    pub duration_days: Option<u32>,
    pub vehicle_category: VehicleCategory,
    pub vehicle_sub_category: Option<String>,
    pub passenger_count: u32,
    pub luggage_count: u32,
    #[serde(default)]
    pub vip_preferences: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
    pub cancelled_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub requester_id: Uuid,
    pub status: BookingStatus,
    pub trip_spec: TripSpec,
    pub estimated_price: f64,
    pub final_price: Option<f64>,
    pub selected_quote_id: Option<Uuid>,
    pub assigned_operator_id: Option<Uuid>,
    pub assigned_driver_id: Option<Uuid>,
    pub assigned_vehicle_id: Option<Uuid>,
    pub payment_ref: Option<String>,
    pub cancellation: Option<Cancellation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::BookingStatus::*;

    #[test]
    fn lifecycle_edges_are_sequential() {
        assert!(New.can_advance_to(Sourcing));
        assert!(Quoting.can_advance_to(OperatorAssigned));
        assert!(Billing.can_advance_to(Paid));

        assert!(!New.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(InProgress));
        assert!(!Quoting.can_advance_to(DriverAssigned));
    }

    #[test]
    fn terminal_states_cannot_cancel() {
        assert!(Sourcing.can_cancel());
        assert!(InProgress.can_cancel());
        assert!(!Completed.can_cancel());
        assert!(!Paid.can_cancel());
        assert!(!Cancelled.can_cancel());
    }
}
