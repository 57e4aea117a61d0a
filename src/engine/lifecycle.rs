use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::engine::{fare, marketplace, tracker};
use crate::error::AppError;
use crate::events::{EventScope, RealtimeEvent, REQUEST_STATUS_CHANGED};
use crate::models::booking::{
    BookingRequest, BookingStatus, Cancellation, ServiceType, TripSpec,
};
use crate::models::trip::{ActiveTrip, Position, Route, TripStatus};
use crate::state::AppState;

pub fn scope_for(booking: &BookingRequest, trip_id: Option<Uuid>) -> EventScope {
    EventScope {
        tenant_id: booking.tenant_id,
        request_id: booking.id,
        trip_id,
        requester_id: booking.requester_id,
        driver_id: booking.assigned_driver_id,
    }
}

fn status_label(status: BookingStatus) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Records the new status, bumps metrics and publishes the status event.
/// Legality must already have been established by the caller. The write is
/// a compare-and-set against `from`: a booking that moved concurrently is
/// left untouched and the caller gets a `Conflict`.
pub(crate) fn apply_status(
    state: &AppState,
    request_id: Uuid,
    from: BookingStatus,
    target: BookingStatus,
) -> Result<BookingRequest, AppError> {
    apply_status_with(state, request_id, from, target, |_| {})
}

pub(crate) fn apply_status_with<F>(
    state: &AppState,
    request_id: Uuid,
    from: BookingStatus,
    target: BookingStatus,
    mutate: F,
) -> Result<BookingRequest, AppError>
where
    F: FnOnce(&mut BookingRequest),
{
    let booking = {
        let mut entry = state
            .bookings
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {request_id} not found")))?;

        if entry.status != from {
            return Err(AppError::Conflict(format!(
                "booking is {:?}, expected {:?}",
                entry.status, from
            )));
        }

        entry.status = target;
        mutate(&mut entry);
        entry.updated_at = Utc::now();
        let booking = entry.clone();

        // Published while the entry is still held, so subscribers observe
        // status events in write order.
        state
            .metrics
            .bookings_total
            .with_label_values(&[&status_label(target)])
            .inc();
        state.publish(RealtimeEvent::new(
            REQUEST_STATUS_CHANGED,
            scope_for(&booking, None),
            &booking,
        ));
        booking
    };

    // Settled or terminal bookings no longer need their settlement lock.
    if matches!(
        target,
        BookingStatus::OperatorAssigned | BookingStatus::Cancelled | BookingStatus::Paid
    ) {
        state.settlement_locks.remove(&request_id);
    }

    info!(booking_id = %booking.id, status = ?target, "booking status changed");
    Ok(booking)
}

fn validate_spec(spec: &TripSpec) -> Result<(), AppError> {
    if spec.pickup.address.trim().is_empty() {
        return Err(AppError::Validation("pickup address is required".to_string()));
    }
    if spec.passenger_count == 0 {
        return Err(AppError::Validation("passenger_count must be > 0".to_string()));
    }

    match spec.service_type {
        ServiceType::PointToPoint => {
            if spec.dropoff.is_none() {
                return Err(AppError::Validation(
                    "dropoff is required for point-to-point bookings".to_string(),
                ));
            }
        }
        ServiceType::HourlyCharter => {
            if spec.duration_hours.unwrap_or(0.0) <= 0.0 {
                return Err(AppError::Validation(
                    "duration_hours is required for hourly charters".to_string(),
                ));
            }
        }
    }

    Ok(())
}

pub async fn create_booking(
    state: &AppState,
    actor: Actor,
    spec: TripSpec,
) -> Result<BookingRequest, AppError> {
    validate_spec(&spec)?;

    let distance_km = match (&spec.service_type, &spec.dropoff) {
        (ServiceType::PointToPoint, Some(dropoff)) => {
            state
                .routes
                .estimate(&spec.pickup.coordinates, &dropoff.coordinates)
                .await?
                .distance_km
        }
        _ => 0.0,
    };

    let rule = state.pricing_rule(actor.tenant_id, spec.vehicle_category);
    let estimate = fare::estimate(
        spec.service_type,
        &rule,
        fare::FareInputs {
            distance_km,
            duration_days: spec.duration_days.unwrap_or(1),
            duration_hours: spec.duration_hours.unwrap_or(0.0),
        },
        &spec.pickup.address,
    )?;

    let now = Utc::now();
    let booking = BookingRequest {
        id: Uuid::new_v4(),
        tenant_id: actor.tenant_id,
        requester_id: actor.user_id,
        status: BookingStatus::Sourcing,
        trip_spec: spec,
        estimated_price: estimate.total,
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
    state
        .metrics
        .bookings_total
        .with_label_values(&[&status_label(BookingStatus::Sourcing)])
        .inc();
    state.publish(RealtimeEvent::new(
        REQUEST_STATUS_CHANGED,
        scope_for(&booking, None),
        &booking,
    ));

    info!(booking_id = %booking.id, estimated_price = estimate.total, "booking created");
    Ok(booking)
}

fn authorize_edge(
    actor: Actor,
    booking: &BookingRequest,
    target: BookingStatus,
) -> Result<(), AppError> {
    if actor.tenant_id != booking.tenant_id {
        return Err(AppError::NotFound(format!("booking {} not found", booking.id)));
    }
    if actor.is_admin() {
        return Ok(());
    }

    let driver_edge = matches!(
        target,
        BookingStatus::DriverEnRoute
            | BookingStatus::Arrived
            | BookingStatus::PassengerOnboard
            | BookingStatus::InProgress
            | BookingStatus::Completed
    );
    if driver_edge {
        if actor.role == Role::Driver && booking.assigned_driver_id == Some(actor.user_id) {
            return Ok(());
        }
        return Err(AppError::IllegalTransition(format!(
            "role {:?} may not move booking to {:?}",
            actor.role, target
        )));
    }

    let operator_edge = matches!(target, BookingStatus::Billing | BookingStatus::Paid);
    if operator_edge {
        if actor.role == Role::Operator && booking.assigned_operator_id == Some(actor.user_id) {
            return Ok(());
        }
        return Err(AppError::IllegalTransition(format!(
            "role {:?} may not move booking to {:?}",
            actor.role, target
        )));
    }

    Ok(())
}

/// Advances a booking along the lifecycle. Cancellation goes through
/// `cancel`, operator selection through `assign_operator`.
pub async fn transition(
    state: &AppState,
    actor: Actor,
    request_id: Uuid,
    target: BookingStatus,
    reason: Option<String>,
) -> Result<BookingRequest, AppError> {
    if target == BookingStatus::Cancelled {
        let reason = reason.filter(|r| !r.trim().is_empty()).ok_or_else(|| {
            AppError::Validation("cancellation requires a reason".to_string())
        })?;
        return cancel(state, actor, request_id, reason).await;
    }

    // Assignment edges carry settlement and trip-creation side effects and
    // are reachable only through their dedicated operations.
    if matches!(
        target,
        BookingStatus::OperatorAssigned | BookingStatus::DriverAssigned
    ) {
        return Err(AppError::IllegalTransition(
            "operator and driver assignment go through their dedicated operations".to_string(),
        ));
    }

    let booking = state
        .bookings
        .get(&request_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("booking {request_id} not found")))?;
    if !booking.status.can_advance_to(target) {
        return Err(AppError::IllegalTransition(format!(
            "{:?} -> {:?} is not a legal booking transition",
            booking.status, target
        )));
    }
    authorize_edge(actor, &booking, target)?;

    if target == BookingStatus::Completed {
        let trip = state
            .trips
            .iter()
            .find(|entry| entry.booking_id == request_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| {
                AppError::Conflict("booking has no active trip to complete".to_string())
            })?;

        let driver_asserted =
            actor.role == Role::Driver && booking.assigned_driver_id == Some(actor.user_id);
        if trip.progress < 100.0 && !driver_asserted {
            return Err(AppError::Conflict(format!(
                "trip progress is {:.0}%, completion must be driver-asserted",
                trip.progress
            )));
        }

        tracker::finish_trip(state, trip.id, TripStatus::Completed).await?;
    }

    if target == BookingStatus::Billing {
        // Preconditions checked before any mutation: a booking that cannot
        // be billed keeps its current status.
        let amount = booking.final_price.ok_or_else(|| {
            AppError::Conflict("booking has no final price to capture".to_string())
        })?;
        let transaction_ref = booking
            .payment_ref
            .clone()
            .ok_or_else(|| AppError::Conflict("booking has no payment reference".to_string()))?;

        apply_status(state, request_id, booking.status, BookingStatus::Billing)?;

        // An upstream capture failure leaves the booking in `BILLING` so
        // the capture can be retried; it is never silently `PAID`.
        state.payments.capture(&transaction_ref, amount).await?;
        return apply_status(state, request_id, BookingStatus::Billing, BookingStatus::Paid);
    }

    apply_status(state, request_id, booking.status, target)
}

pub async fn assign_operator(
    state: &AppState,
    actor: Actor,
    request_id: Uuid,
    quote_id: Uuid,
) -> Result<BookingRequest, AppError> {
    let quote = state
        .quotes
        .get(&quote_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("quote {quote_id} not found")))?;
    if quote.request_id != request_id {
        return Err(AppError::Conflict(format!(
            "quote {quote_id} does not belong to booking {request_id}"
        )));
    }

    marketplace::accept_quote(state, actor, quote_id).await
}

pub async fn assign_driver(
    state: &AppState,
    actor: Actor,
    request_id: Uuid,
    driver_id: Uuid,
    vehicle_id: Uuid,
) -> Result<ActiveTrip, AppError> {
    let booking = state
        .bookings
        .get(&request_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("booking {request_id} not found")))?;

    if actor.tenant_id != booking.tenant_id {
        return Err(AppError::NotFound(format!("booking {request_id} not found")));
    }
    if booking.status != BookingStatus::OperatorAssigned {
        return Err(AppError::Conflict(format!(
            "driver can only be assigned while OPERATOR_ASSIGNED, booking is {:?}",
            booking.status
        )));
    }
    if !actor.is_admin()
        && !(actor.role == Role::Operator && booking.assigned_operator_id == Some(actor.user_id))
    {
        return Err(AppError::IllegalTransition(
            "only the assigned operator may assign a driver".to_string(),
        ));
    }

    let spec = &booking.trip_spec;
    let dropoff = spec
        .dropoff
        .clone()
        .ok_or_else(|| AppError::Conflict("booking has no dropoff to route to".to_string()))?;

    let route_estimate = state
        .routes
        .estimate(&spec.pickup.coordinates, &dropoff.coordinates)
        .await?;

    let now = Utc::now();
    let trip = ActiveTrip {
        id: Uuid::new_v4(),
        booking_id: booking.id,
        tenant_id: booking.tenant_id,
        requester_id: booking.requester_id,
        driver_id,
        vehicle_id,
        status: TripStatus::DriverAssigned,
        route: Route {
            pickup: spec.pickup.coordinates,
            pickup_address: spec.pickup.address.clone(),
            dropoff: dropoff.coordinates,
            dropoff_address: dropoff.address,
            waypoints: route_estimate.waypoints,
            total_distance_km: route_estimate.distance_km,
            total_duration_min: route_estimate.duration_min,
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
        started_at: None,
        updated_at: now,
    };

    {
        let mut entry = state
            .bookings
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {request_id} not found")))?;
        entry.assigned_driver_id = Some(driver_id);
        entry.assigned_vehicle_id = Some(vehicle_id);
    }

    state.trips.insert(trip.id, trip.clone());
    state.metrics.active_trips.inc();
    apply_status(
        state,
        request_id,
        BookingStatus::OperatorAssigned,
        BookingStatus::DriverAssigned,
    )?;

    info!(booking_id = %request_id, trip_id = %trip.id, %driver_id, "driver assigned");
    Ok(trip)
}

/// Cancels a booking. Stops any live trip in the same logical operation and
/// signals refund intent when a fare was already pre-authorized.
pub async fn cancel(
    state: &AppState,
    actor: Actor,
    request_id: Uuid,
    reason: String,
) -> Result<BookingRequest, AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::Validation("cancellation reason is required".to_string()));
    }

    let booking = state
        .bookings
        .get(&request_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("booking {request_id} not found")))?;

    if actor.tenant_id != booking.tenant_id {
        return Err(AppError::NotFound(format!("booking {request_id} not found")));
    }
    if !actor.is_admin() && booking.requester_id != actor.user_id {
        return Err(AppError::IllegalTransition(
            "only the requester or an admin may cancel".to_string(),
        ));
    }
    if !booking.status.can_cancel() {
        return Err(AppError::IllegalTransition(format!(
            "booking in {:?} can no longer be cancelled",
            booking.status
        )));
    }

    let live_trip = state
        .trips
        .iter()
        .find(|entry| entry.booking_id == request_id && !entry.status.is_terminal())
        .map(|entry| entry.id);
    if let Some(trip_id) = live_trip {
        tracker::finish_trip(state, trip_id, TripStatus::Cancelled).await?;
    }

    let updated = apply_status_with(
        state,
        request_id,
        booking.status,
        BookingStatus::Cancelled,
        |entry| {
            entry.cancellation = Some(Cancellation {
                reason: reason.clone(),
                cancelled_at: Utc::now(),
                cancelled_by: actor.user_id,
            });
        },
    )?;

    if let (Some(transaction_ref), Some(amount)) = (&updated.payment_ref, updated.final_price) {
        if let Err(err) = state.payments.refund(transaction_ref, amount, &reason).await {
            warn!(booking_id = %request_id, error = %err, "refund signal failed");
        }
    }

    Ok(updated)
}
