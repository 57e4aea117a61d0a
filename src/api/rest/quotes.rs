use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::marketplace::{self, QuoteSubmission};
use crate::error::AppError;
use crate::models::booking::BookingRequest;
use crate::models::quote::{OperatorQuote, QuoteListing};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings/:id/quotes", post(submit_quote).get(list_quotes))
        .route("/quotes/:id/accept", post(accept_quote))
        .route("/quotes/:id/withdraw", post(withdraw_quote))
}

#[derive(serde::Deserialize)]
pub struct SubmitQuoteRequest {
    pub vehicle_id: Uuid,
    pub price: f64,
    pub eta_minutes: u32,
    #[serde(default)]
    pub operator_rating: f64,
    pub notes: Option<String>,
}

async fn submit_quote(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitQuoteRequest>,
) -> Result<Json<OperatorQuote>, AppError> {
    let quote = marketplace::submit_quote(
        &state,
        actor,
        id,
        QuoteSubmission {
            vehicle_id: payload.vehicle_id,
            price: payload.price,
            eta_minutes: payload.eta_minutes,
            operator_rating: payload.operator_rating,
            notes: payload.notes,
        },
    )
    .await?;

    Ok(Json(quote))
}

async fn list_quotes(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<QuoteListing>>, AppError> {
    Ok(Json(marketplace::list_quotes(&state, id)?))
}

async fn accept_quote(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingRequest>, AppError> {
    let booking = marketplace::accept_quote(&state, actor, id).await?;
    Ok(Json(booking))
}

async fn withdraw_quote(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<OperatorQuote>, AppError> {
    let quote = marketplace::withdraw_quote(&state, actor, id)?;
    Ok(Json(quote))
}
