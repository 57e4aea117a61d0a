use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const REQUEST_STATUS_CHANGED: &str = "request.status.changed";
pub const QUOTE_RECEIVED: &str = "quote.received";
pub const QUOTE_ACCEPTED: &str = "quote.accepted";
pub const TRIP_LOCATION_UPDATED: &str = "trip.location.updated";
pub const TRIP_STATUS_CHANGED: &str = "trip.status.changed";

/// Delivery scope of an event. Subscribers are matched server-side against
/// tenant first, then optionally against a request or trip id.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EventScope {
    pub tenant_id: Uuid,
    pub request_id: Uuid,
    pub trip_id: Option<Uuid>,
    pub requester_id: Uuid,
    pub driver_id: Option<Uuid>,
}

/// Full-entity event payload; no delta encoding, subscribers replace their
/// local copy wholesale.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeEvent {
    pub event: &'static str,
    pub scope: EventScope,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl RealtimeEvent {
    pub fn new<T: Serialize>(event: &'static str, scope: EventScope, entity: &T) -> Self {
        Self {
            event,
            scope,
            payload: serde_json::to_value(entity).unwrap_or(serde_json::Value::Null),
            timestamp: Utc::now(),
        }
    }

    pub fn matches(&self, tenant_id: Uuid, request_id: Option<Uuid>, trip_id: Option<Uuid>) -> bool {
        if self.scope.tenant_id != tenant_id {
            return false;
        }
        if let Some(request_id) = request_id {
            if self.scope.request_id != request_id {
                return false;
            }
        }
        if let Some(trip_id) = trip_id {
            if self.scope.trip_id != Some(trip_id) {
                return false;
            }
        }
        true
    }
}
