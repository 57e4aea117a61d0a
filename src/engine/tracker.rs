use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::engine::lifecycle;
use crate::error::AppError;
use crate::events::{
    EventScope, RealtimeEvent, TRIP_LOCATION_UPDATED, TRIP_STATUS_CHANGED,
};
use crate::geo;
use crate::models::booking::BookingStatus;
use crate::models::trip::{ActiveTrip, GeoPoint, Position, Route, TripStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManualStatus {
    Arrive,
    Pickup,
    Complete,
}

fn trip_scope(trip: &ActiveTrip) -> EventScope {
    EventScope {
        tenant_id: trip.tenant_id,
        request_id: trip.booking_id,
        trip_id: Some(trip.id),
        requester_id: trip.requester_id,
        driver_id: Some(trip.driver_id),
    }
}

fn authorize_driver(actor: Actor, trip: &ActiveTrip) -> Result<(), AppError> {
    if actor.tenant_id != trip.tenant_id {
        return Err(AppError::NotFound(format!("trip {} not found", trip.id)));
    }
    if actor.is_admin() || (actor.role == Role::Driver && trip.driver_id == actor.user_id) {
        return Ok(());
    }
    Err(AppError::IllegalTransition(
        "only the assigned driver may report trip status".to_string(),
    ))
}

/// Driver accepts the job: moves the trip (and booking) to en-route and
/// spawns the tick task. Calling again on a started trip is a no-op so
/// client retries are harmless.
pub async fn start_trip(
    state: &Arc<AppState>,
    actor: Actor,
    trip_id: Uuid,
) -> Result<ActiveTrip, AppError> {
    let trip = state
        .trips
        .get(&trip_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

    authorize_driver(actor, &trip)?;

    if trip.started_at.is_some() {
        return Ok(trip);
    }

    let updated = {
        let mut entry = state
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;
        if entry.status != TripStatus::DriverAssigned {
            return Err(AppError::Conflict(format!(
                "trip is {:?}, cannot start",
                entry.status
            )));
        }
        entry.status = TripStatus::DriverEnRoute;
        entry.started_at = Some(Utc::now());
        entry.updated_at = Utc::now();
        let snapshot = entry.clone();
        state.publish(RealtimeEvent::new(
            TRIP_STATUS_CHANGED,
            trip_scope(&snapshot),
            &snapshot,
        ));
        snapshot
    };

    lifecycle::apply_status(
        state,
        trip.booking_id,
        BookingStatus::DriverAssigned,
        BookingStatus::DriverEnRoute,
    )?;

    spawn_ticker(state.clone(), trip_id);

    info!(trip_id = %trip_id, booking_id = %trip.booking_id, "trip started");
    Ok(updated)
}

fn spawn_ticker(state: Arc<AppState>, trip_id: Uuid) {
    // entry() keeps spawn-check-insert atomic, so retries never leave two
    // tick tasks for the same trip.
    state.tick_tasks.entry(trip_id).or_insert_with(|| {
        let task_state = state.clone();
        tokio::spawn(async move {
            let interval = std::time::Duration::from_millis(task_state.config.tick_interval_ms);
            loop {
                sleep(interval).await;
                if !advance_tick(&task_state, trip_id) {
                    break;
                }
            }
            task_state.tick_tasks.remove(&trip_id);
            debug!(trip_id = %trip_id, "tick task finished");
        })
    });
}

fn position_along(route: &Route, fraction: f64) -> GeoPoint {
    let points = &route.waypoints;
    if points.len() < 2 {
        return route.dropoff;
    }

    let segments = (points.len() - 1) as f64;
    let scaled = fraction.clamp(0.0, 1.0) * segments;
    let index = (scaled.floor() as usize).min(points.len() - 2);
    let within = scaled - index as f64;

    geo::interpolate(&points[index], &points[index + 1], within)
}

/// One simulation step: advance progress, interpolate the position along
/// the route, derive speed from the travelled delta and refresh the ETA.
/// Returns false once the trip needs no further ticks.
pub fn advance_tick(state: &AppState, trip_id: Uuid) -> bool {
    let Some(mut entry) = state.trips.get_mut(&trip_id) else {
        return false;
    };

    // Hold position while waiting at the kerb; keep ticking.
    if entry.status == TripStatus::Arrived {
        return true;
    }
    if !matches!(
        entry.status,
        TripStatus::DriverEnRoute | TripStatus::PassengerOnboard | TripStatus::InProgress
    ) {
        return false;
    }
    if entry.progress >= 100.0 {
        return false;
    }

    let step = 100.0 / state.config.trip_tick_steps as f64;
    let tick_secs = state.config.tick_interval_ms as f64 / 1000.0;

    let previous = GeoPoint {
        lat: entry.current_location.lat,
        lng: entry.current_location.lng,
    };
    let progress = (entry.progress + step).clamp(0.0, 100.0);
    let position = position_along(&entry.route, progress / 100.0);

    let moved_km = geo::haversine_km(&previous, &position);
    let speed_kmh = if tick_secs > 0.0 {
        moved_km / tick_secs * 3600.0
    } else {
        0.0
    };

    let remaining_ticks = ((100.0 - progress) / step).ceil() as i64;
    let now = Utc::now();

    entry.progress = progress;
    entry.current_location = Position {
        lat: position.lat,
        lng: position.lng,
        heading_deg: geo::bearing_deg(&previous, &position),
        speed_kmh,
        recorded_at: now,
    };
    entry.estimated_arrival =
        Some(now + Duration::milliseconds(remaining_ticks * state.config.tick_interval_ms as i64));
    entry.updated_at = now;

    // Published while the entry is still held: a concurrent stop cannot
    // write its terminal status until this location event is out, so no
    // location event ever follows the terminal one.
    let snapshot = entry.clone();
    state.publish(RealtimeEvent::new(
        TRIP_LOCATION_UPDATED,
        trip_scope(&snapshot),
        &snapshot,
    ));
    drop(entry);

    snapshot.progress < 100.0
}

/// Raw position report from the driver device. Does not touch progress;
/// the ingested fix simply becomes the authoritative current location.
pub fn ingest_location(
    state: &AppState,
    actor: Actor,
    trip_id: Uuid,
    point: GeoPoint,
) -> Result<ActiveTrip, AppError> {
    let snapshot = {
        let mut entry = state
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

        authorize_driver(actor, &entry)?;
        if entry.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "trip is {:?}, no further locations accepted",
                entry.status
            )));
        }

        let previous = GeoPoint {
            lat: entry.current_location.lat,
            lng: entry.current_location.lng,
        };
        let now = Utc::now();
        let elapsed_secs = (now - entry.current_location.recorded_at)
            .num_milliseconds()
            .max(1) as f64
            / 1000.0;
        let moved_km = geo::haversine_km(&previous, &point);

        entry.current_location = Position {
            lat: point.lat,
            lng: point.lng,
            heading_deg: geo::bearing_deg(&previous, &point),
            speed_kmh: moved_km / elapsed_secs * 3600.0,
            recorded_at: now,
        };
        entry.updated_at = now;
        let snapshot = entry.clone();
        state.publish(RealtimeEvent::new(
            TRIP_LOCATION_UPDATED,
            trip_scope(&snapshot),
            &snapshot,
        ));
        snapshot
    };

    Ok(snapshot)
}

/// Driver-triggered status changes, independent of the tick task.
pub async fn record_manual_status(
    state: &AppState,
    actor: Actor,
    trip_id: Uuid,
    action: ManualStatus,
) -> Result<ActiveTrip, AppError> {
    let trip = state
        .trips
        .get(&trip_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

    authorize_driver(actor, &trip)?;

    match action {
        ManualStatus::Arrive => {
            if trip.status != TripStatus::DriverEnRoute {
                return Err(AppError::IllegalTransition(format!(
                    "cannot report arrival from {:?}",
                    trip.status
                )));
            }
            set_trip_status(state, trip_id, TripStatus::DriverEnRoute, TripStatus::Arrived)?;
            lifecycle::apply_status(
                state,
                trip.booking_id,
                BookingStatus::DriverEnRoute,
                BookingStatus::Arrived,
            )?;
        }
        ManualStatus::Pickup => {
            if trip.status != TripStatus::Arrived {
                return Err(AppError::IllegalTransition(format!(
                    "cannot report pickup from {:?}",
                    trip.status
                )));
            }
            // Onboard and underway are one observable phase: both booking
            // edges apply in this single operation.
            set_trip_status(state, trip_id, TripStatus::Arrived, TripStatus::InProgress)?;
            lifecycle::apply_status(
                state,
                trip.booking_id,
                BookingStatus::Arrived,
                BookingStatus::PassengerOnboard,
            )?;
            lifecycle::apply_status(
                state,
                trip.booking_id,
                BookingStatus::PassengerOnboard,
                BookingStatus::InProgress,
            )?;
        }
        ManualStatus::Complete => {
            if !matches!(
                trip.status,
                TripStatus::PassengerOnboard | TripStatus::InProgress
            ) {
                return Err(AppError::IllegalTransition(format!(
                    "cannot complete a trip from {:?}",
                    trip.status
                )));
            }
            finish_trip(state, trip_id, TripStatus::Completed).await?;
            lifecycle::apply_status(
                state,
                trip.booking_id,
                BookingStatus::InProgress,
                BookingStatus::Completed,
            )?;
        }
    }

    state
        .trips
        .get(&trip_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))
}

/// Compare-and-set on the trip status; a trip that moved concurrently is
/// left untouched.
fn set_trip_status(
    state: &AppState,
    trip_id: Uuid,
    from: TripStatus,
    to: TripStatus,
) -> Result<ActiveTrip, AppError> {
    let mut entry = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;
    if entry.status != from {
        return Err(AppError::Conflict(format!(
            "trip is {:?}, expected {:?}",
            entry.status, from
        )));
    }
    entry.status = to;
    entry.updated_at = Utc::now();

    let snapshot = entry.clone();
    state.publish(RealtimeEvent::new(
        TRIP_STATUS_CHANGED,
        trip_scope(&snapshot),
        &snapshot,
    ));
    Ok(snapshot)
}

/// Terminal stop: cancels the tick task exactly once and freezes the trip.
/// The terminal write happens under the map entry, and every publisher
/// holds the entry through its own publish, so once this returns no
/// further location events can follow the terminal status event.
pub async fn finish_trip(
    state: &AppState,
    trip_id: Uuid,
    final_status: TripStatus,
) -> Result<(), AppError> {
    debug_assert!(final_status.is_terminal());

    if let Some((_, handle)) = state.tick_tasks.remove(&trip_id) {
        handle.abort();
    }

    {
        let mut entry = state
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;
        if entry.status.is_terminal() {
            return Ok(());
        }
        entry.status = final_status;
        if final_status == TripStatus::Completed {
            entry.progress = 100.0;
        }
        entry.updated_at = Utc::now();

        let snapshot = entry.clone();
        state.publish(RealtimeEvent::new(
            TRIP_STATUS_CHANGED,
            trip_scope(&snapshot),
            &snapshot,
        ));
    }
    state.metrics.active_trips.dec();

    info!(trip_id = %trip_id, status = ?final_status, "trip finished");
    Ok(())
}
