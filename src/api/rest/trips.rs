use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::tracker::{self, ManualStatus};
use crate::error::AppError;
use crate::models::trip::{ActiveTrip, GeoPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trips/:id", get(get_trip))
        .route("/trips/:id/start", post(start_trip))
        .route("/trips/:id/status", post(report_status))
        .route("/trips/:id/location", post(report_location))
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ActiveTrip>, AppError> {
    let trip = state
        .trips
        .get(&id)
        .filter(|entry| entry.tenant_id == actor.tenant_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("trip {id} not found")))?;

    Ok(Json(trip))
}

async fn start_trip(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ActiveTrip>, AppError> {
    let trip = tracker::start_trip(&state, actor, id).await?;
    Ok(Json(trip))
}

#[derive(serde::Deserialize)]
pub struct ReportStatusRequest {
    pub action: ManualStatus,
}

async fn report_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportStatusRequest>,
) -> Result<Json<ActiveTrip>, AppError> {
    let trip = tracker::record_manual_status(&state, actor, id, payload.action).await?;
    Ok(Json(trip))
}

#[derive(serde::Deserialize)]
pub struct ReportLocationRequest {
    pub location: GeoPoint,
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportLocationRequest>,
) -> Result<Json<ActiveTrip>, AppError> {
    let trip = tracker::ingest_location(&state, actor, id, payload.location)?;
    Ok(Json(trip))
}
