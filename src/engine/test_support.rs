use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::config::Config;
use crate::models::booking::{
    BookingRequest, BookingStatus, ServiceType, StopDescriptor, TripSpec,
};
use crate::models::pricing::VehicleCategory;
use crate::models::trip::{ActiveTrip, GeoPoint, Position, Route, TripStatus};
use crate::state::AppState;

pub fn state() -> Arc<AppState> {
    state_with(Config::default())
}

pub fn state_with(config: Config) -> Arc<AppState> {
    Arc::new(AppState::new(config))
}

pub fn actor(role: Role, tenant_id: Uuid) -> Actor {
    Actor {
        user_id: Uuid::new_v4(),
        role,
        tenant_id,
    }
}

pub fn trip_spec() -> TripSpec {
    TripSpec {
        service_type: ServiceType::PointToPoint,
        pickup: StopDescriptor {
            address: "1 Aldgate, London".to_string(),
            coordinates: GeoPoint {
                lat: 51.5136,
                lng: -0.0775,
            },
        },
        dropoff: Some(StopDescriptor {
            address: "Heathrow Terminal 5, London".to_string(),
            coordinates: GeoPoint {
                lat: 51.4722,
                lng: -0.4889,
            },
        }),
        scheduled_at: Utc::now(),
        duration_hours: None,
        duration_days: None,
        vehicle_category: VehicleCategory::Sedan,
        vehicle_sub_category: None,
        passenger_count: 2,
        luggage_count: 1,
        vip_preferences: Vec::new(),
    }
}

pub fn seed_booking(state: &AppState, requester: Actor, status: BookingStatus) -> BookingRequest {
    let now = Utc::now();
    let booking = BookingRequest {
        id: Uuid::new_v4(),
        tenant_id: requester.tenant_id,
        requester_id: requester.user_id,
        status,
        trip_spec: trip_spec(),
        estimated_price: 100.0,
        final_price: None,
        selected_quote_id: None,
        assigned_operator_id: None,
        assigned_driver_id: None,
        assigned_vehicle_id: None,
        payment_ref: None,
        cancellation: None,
        created_at: now,
        updated_at: now,
    };
    state.bookings.insert(booking.id, booking.clone());
    booking
}

pub fn seed_trip(
    state: &AppState,
    booking: &BookingRequest,
    driver: Actor,
    status: TripStatus,
) -> ActiveTrip {
    let spec = &booking.trip_spec;
    let dropoff = spec.dropoff.clone().expect("test booking has dropoff");
    let now = Utc::now();

    let trip = ActiveTrip {
        id: Uuid::new_v4(),
        booking_id: booking.id,
        tenant_id: booking.tenant_id,
        requester_id: booking.requester_id,
        driver_id: driver.user_id,
        vehicle_id: Uuid::new_v4(),
        status,
        route: Route {
            pickup: spec.pickup.coordinates,
            pickup_address: spec.pickup.address.clone(),
            dropoff: dropoff.coordinates,
            dropoff_address: dropoff.address,
            waypoints: vec![spec.pickup.coordinates, dropoff.coordinates],
            total_distance_km: 30.0,
            total_duration_min: 45.0,
        },
        current_location: Position {
            lat: spec.pickup.coordinates.lat,
            lng: spec.pickup.coordinates.lng,
            heading_deg: 0.0,
            speed_kmh: 0.0,
            recorded_at: now,
        },
        progress: 0.0,
        estimated_arrival: None,
        started_at: if status == TripStatus::DriverAssigned {
            None
        } else {
            Some(now)
        },
        updated_at: now,
    };

    state.trips.insert(trip.id, trip.clone());
    state
        .bookings
        .get_mut(&booking.id)
        .expect("booking exists")
        .assigned_driver_id = Some(driver.user_id);
    trip
}
