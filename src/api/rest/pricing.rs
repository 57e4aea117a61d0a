use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::auth::{Actor, Role};
use crate::error::AppError;
use crate::models::pricing::{PricingRule, VehicleCategory};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pricing", get(list_rules))
        .route("/pricing/:category", put(update_rule))
}

const ALL_CATEGORIES: [VehicleCategory; 5] = [
    VehicleCategory::Sedan,
    VehicleCategory::Suv,
    VehicleCategory::Van,
    VehicleCategory::Limousine,
    VehicleCategory::Coach,
];

async fn list_rules(State(state): State<Arc<AppState>>, actor: Actor) -> Json<Vec<PricingRule>> {
    let rules = ALL_CATEGORIES
        .iter()
        .map(|category| state.pricing_rule(actor.tenant_id, *category))
        .collect();
    Json(rules)
}

#[derive(Deserialize)]
pub struct UpdateRuleRequest {
    pub hourly_rate: f64,
    pub base_fare_p2p: f64,
    pub per_distance_unit_rate: f64,
    pub minimum_billable_hours: f64,
    pub driver_commission_fraction: f64,
}

async fn update_rule(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(category): Path<VehicleCategory>,
    Json(payload): Json<UpdateRuleRequest>,
) -> Result<Json<PricingRule>, AppError> {
    if !matches!(actor.role, Role::Operator | Role::Admin) {
        return Err(AppError::IllegalTransition(
            "only operators and admins may update rates".to_string(),
        ));
    }

    let rule = PricingRule {
        tenant_id: actor.tenant_id,
        category,
        hourly_rate: payload.hourly_rate,
        base_fare_p2p: payload.base_fare_p2p,
        per_distance_unit_rate: payload.per_distance_unit_rate,
        minimum_billable_hours: payload.minimum_billable_hours,
        driver_commission_fraction: payload.driver_commission_fraction,
        updated_at: Utc::now(),
    };
    rule.validate().map_err(AppError::Validation)?;

    state.pricing.insert((actor.tenant_id, category), rule.clone());
    Ok(Json(rule))
}
