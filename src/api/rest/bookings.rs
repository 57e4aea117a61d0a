use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::booking::{BookingRequest, BookingStatus, TripSpec};
use crate::models::trip::ActiveTrip;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/status", post(transition_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/operator", post(assign_operator))
        .route("/bookings/:id/driver", post(assign_driver))
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(spec): Json<TripSpec>,
) -> Result<Json<BookingRequest>, AppError> {
    let booking = lifecycle::create_booking(&state, actor, spec).await?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub requester_id: Option<Uuid>,
    pub operator_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
}

async fn list_bookings(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(filter): Query<BookingFilter>,
) -> Json<Vec<BookingRequest>> {
    let mut bookings: Vec<BookingRequest> = state
        .bookings
        .iter()
        .filter(|entry| {
            entry.tenant_id == actor.tenant_id
                && filter.status.map_or(true, |status| entry.status == status)
                && filter
                    .requester_id
                    .map_or(true, |id| entry.requester_id == id)
                && filter
                    .operator_id
                    .map_or(true, |id| entry.assigned_operator_id == Some(id))
                && filter
                    .driver_id
                    .map_or(true, |id| entry.assigned_driver_id == Some(id))
        })
        .map(|entry| entry.clone())
        .collect();

    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(bookings)
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingRequest>, AppError> {
    let booking = state
        .bookings
        .get(&id)
        .filter(|entry| entry.tenant_id == actor.tenant_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))?;

    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: BookingStatus,
    pub reason: Option<String>,
}

async fn transition_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<BookingRequest>, AppError> {
    let booking =
        lifecycle::transition(&state, actor, id, payload.status, payload.reason).await?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<BookingRequest>, AppError> {
    let booking = lifecycle::cancel(&state, actor, id, payload.reason).await?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct AssignOperatorRequest {
    pub quote_id: Uuid,
}

async fn assign_operator(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignOperatorRequest>,
) -> Result<Json<BookingRequest>, AppError> {
    let booking = lifecycle::assign_operator(&state, actor, id, payload.quote_id).await?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<ActiveTrip>, AppError> {
    let trip =
        lifecycle::assign_driver(&state, actor, id, payload.driver_id, payload.vehicle_id).await?;
    Ok(Json(trip))
}
