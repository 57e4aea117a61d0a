use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::engine::lifecycle;
use crate::error::AppError;
use crate::events::{RealtimeEvent, QUOTE_ACCEPTED, QUOTE_RECEIVED};
use crate::models::booking::{BookingRequest, BookingStatus};
use crate::models::quote::{OperatorQuote, QuoteListing, QuoteStatus};
use crate::state::AppState;

pub struct QuoteSubmission {
    pub vehicle_id: Uuid,
    pub price: f64,
    pub eta_minutes: u32,
    pub operator_rating: f64,
    pub notes: Option<String>,
}

pub async fn submit_quote(
    state: &AppState,
    actor: Actor,
    request_id: Uuid,
    submission: QuoteSubmission,
) -> Result<OperatorQuote, AppError> {
    if actor.role != Role::Operator && !actor.is_admin() {
        return Err(AppError::IllegalTransition(
            "only operators may submit quotes".to_string(),
        ));
    }
    if submission.price <= 0.0 {
        return Err(AppError::Validation("quote price must be > 0".to_string()));
    }

    // Serialized with settlement so a bid cannot land after quoting closes.
    let lock = state.settlement_lock(request_id);
    let _guard = lock.lock().await;

    let booking = state
        .bookings
        .get(&request_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("booking {request_id} not found")))?;
    if booking.tenant_id != actor.tenant_id {
        return Err(AppError::NotFound(format!("booking {request_id} not found")));
    }

    if !matches!(
        booking.status,
        BookingStatus::Sourcing | BookingStatus::Quoting
    ) {
        return Err(AppError::Conflict(format!(
            "booking is {:?}, quoting is closed",
            booking.status
        )));
    }

    let now = Utc::now();
    let quote = OperatorQuote {
        id: Uuid::new_v4(),
        request_id,
        tenant_id: booking.tenant_id,
        operator_id: actor.user_id,
        vehicle_id: submission.vehicle_id,
        price: submission.price,
        eta_minutes: submission.eta_minutes,
        operator_rating: submission.operator_rating.clamp(0.0, 5.0),
        notes: submission.notes,
        status: QuoteStatus::Pending,
        created_at: now,
        expires_at: now + Duration::minutes(state.config.quote_expiry_minutes),
        updated_at: now,
    };

    state.quotes.insert(quote.id, quote.clone());
    state.metrics.quotes_submitted_total.inc();

    // First bid moves the request into the open-bidding phase.
    if booking.status == BookingStatus::Sourcing {
        lifecycle::apply_status(
            state,
            request_id,
            BookingStatus::Sourcing,
            BookingStatus::Quoting,
        )?;
    }

    state.publish(RealtimeEvent::new(
        QUOTE_RECEIVED,
        lifecycle::scope_for(&booking, None),
        &quote,
    ));

    info!(booking_id = %request_id, quote_id = %quote.id, price = quote.price, "quote submitted");
    Ok(quote)
}

/// Quotes for a request, cheapest first; ties break on earlier submission.
/// The lowest-priced pending quote carries the `best_value` marker.
pub fn list_quotes(state: &AppState, request_id: Uuid) -> Result<Vec<QuoteListing>, AppError> {
    if !state.bookings.contains_key(&request_id) {
        return Err(AppError::NotFound(format!("booking {request_id} not found")));
    }

    let mut quotes: Vec<OperatorQuote> = state
        .quotes
        .iter()
        .filter(|entry| entry.request_id == request_id)
        .map(|entry| entry.clone())
        .collect();

    quotes.sort_by(|a, b| {
        a.price
            .total_cmp(&b.price)
            .then(a.created_at.cmp(&b.created_at))
    });

    let best_value_id = quotes
        .iter()
        .find(|quote| quote.status == QuoteStatus::Pending)
        .map(|quote| quote.id);

    Ok(quotes
        .into_iter()
        .map(|quote| QuoteListing {
            best_value: Some(quote.id) == best_value_id,
            quote,
        })
        .collect())
}

/// Settles the marketplace for one request: the targeted quote wins, every
/// sibling still pending loses. Serialized per request so two concierges
/// racing on different quotes cannot both succeed.
pub async fn accept_quote(
    state: &AppState,
    actor: Actor,
    quote_id: Uuid,
) -> Result<BookingRequest, AppError> {
    let request_id = state
        .quotes
        .get(&quote_id)
        .map(|entry| entry.request_id)
        .ok_or_else(|| AppError::NotFound(format!("quote {quote_id} not found")))?;

    let lock = state.settlement_lock(request_id);
    let _guard = lock.lock().await;
    let started = Instant::now();

    let result = settle(state, actor, request_id, quote_id).await;

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .settlement_latency_seconds
        .with_label_values(&[outcome])
        .observe(started.elapsed().as_secs_f64());

    result
}

async fn settle(
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

    let booking = state
        .bookings
        .get(&request_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("booking {request_id} not found")))?;

    if booking.tenant_id != actor.tenant_id {
        return Err(AppError::NotFound(format!("booking {request_id} not found")));
    }
    if !actor.is_admin() && booking.requester_id != actor.user_id {
        return Err(AppError::IllegalTransition(
            "only the requester or an admin may accept a quote".to_string(),
        ));
    }

    let now = Utc::now();
    if quote.is_expired(now) {
        decline(state, quote_id, now);
        return Err(AppError::Conflict(format!("quote {quote_id} has expired")));
    }
    if quote.status != QuoteStatus::Pending {
        return Err(AppError::Conflict(format!(
            "quote {quote_id} is {:?}, not pending",
            quote.status
        )));
    }
    if booking.status != BookingStatus::Quoting {
        return Err(AppError::Conflict(format!(
            "booking is {:?}, no quote can be accepted",
            booking.status
        )));
    }

    // Fail fast before any mutation: pre-authorization happens outside the
    // settled state so an upstream failure leaves everything untouched.
    let transaction_ref = state.payments.preauthorize(quote.price).await?;

    // The booking write is the settlement point: a compare-and-set against
    // `Quoting`, so a concurrent cancellation fails this call before any
    // quote has been touched.
    let updated = lifecycle::apply_status_with(
        state,
        request_id,
        BookingStatus::Quoting,
        BookingStatus::OperatorAssigned,
        |entry| {
            entry.selected_quote_id = Some(quote_id);
            entry.assigned_operator_id = Some(quote.operator_id);
            entry.final_price = Some(quote.price);
            entry.payment_ref = Some(transaction_ref);
        },
    )?;

    let siblings: Vec<Uuid> = state
        .quotes
        .iter()
        .filter(|entry| {
            entry.request_id == request_id
                && entry.id != quote_id
                && entry.status == QuoteStatus::Pending
        })
        .map(|entry| entry.id)
        .collect();
    for sibling_id in siblings {
        decline(state, sibling_id, now);
    }

    let accepted = match state.quotes.get_mut(&quote_id) {
        Some(mut entry) => {
            entry.status = QuoteStatus::Accepted;
            entry.updated_at = now;
            entry.clone()
        }
        None => quote,
    };

    state.publish(RealtimeEvent::new(
        QUOTE_ACCEPTED,
        lifecycle::scope_for(&updated, None),
        &accepted,
    ));

    info!(booking_id = %request_id, quote_id = %quote_id, price = accepted.price, "quote accepted");
    Ok(updated)
}

pub fn withdraw_quote(
    state: &AppState,
    actor: Actor,
    quote_id: Uuid,
) -> Result<OperatorQuote, AppError> {
    let mut entry = state
        .quotes
        .get_mut(&quote_id)
        .ok_or_else(|| AppError::NotFound(format!("quote {quote_id} not found")))?;

    if entry.tenant_id != actor.tenant_id {
        return Err(AppError::NotFound(format!("quote {quote_id} not found")));
    }
    if !actor.is_admin() && entry.operator_id != actor.user_id {
        return Err(AppError::IllegalTransition(
            "only the bidding operator may withdraw a quote".to_string(),
        ));
    }
    if entry.status != QuoteStatus::Pending {
        return Err(AppError::Conflict(format!(
            "quote is {:?}, only pending quotes can be withdrawn",
            entry.status
        )));
    }

    entry.status = QuoteStatus::Declined;
    entry.updated_at = Utc::now();
    Ok(entry.clone())
}

fn decline(state: &AppState, quote_id: Uuid, now: chrono::DateTime<Utc>) {
    if let Some(mut entry) = state.quotes.get_mut(&quote_id) {
        entry.status = QuoteStatus::Declined;
        entry.updated_at = now;
    }
}

/// Moves every pending quote past its expiry into declined. Accepted quotes
/// are never touched.
pub fn sweep_expired_quotes(state: &AppState) -> usize {
    let now = Utc::now();
    let expired: Vec<Uuid> = state
        .quotes
        .iter()
        .filter(|entry| entry.is_expired(now))
        .map(|entry| entry.id)
        .collect();

    for quote_id in &expired {
        decline(state, *quote_id, now);
        state.metrics.quotes_expired_total.inc();
        debug!(quote_id = %quote_id, "quote expired");
    }

    expired.len()
}

pub async fn run_expiry_sweep(state: Arc<AppState>) {
    info!(
        interval_secs = state.config.sweep_interval_secs,
        "quote expiry sweep started"
    );

    loop {
        sleep(std::time::Duration::from_secs(state.config.sweep_interval_secs)).await;

        let swept = sweep_expired_quotes(&state);
        if swept > 0 {
            warn!(count = swept, "declined expired quotes");
        }
    }
}
