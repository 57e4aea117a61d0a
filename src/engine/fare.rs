use serde::Serialize;

use crate::error::AppError;
use crate::models::booking::ServiceType;
use crate::models::pricing::PricingRule;

/// Fixed platform take on every fare. Not operator-configurable.
pub const PLATFORM_FEE_RATE: f64 = 0.05;

/// Fallback fractional tax rate when no region is recognized.
pub const DEFAULT_TAX_RATE: f64 = 0.05;

/// Approximate regional rates keyed on case-insensitive address substrings.
/// An approximation, not a tax-authority integration; callers may pass any
/// other locator to `estimate_with_locator`.
const REGION_TAX_RATES: &[(&str, f64)] = &[
    ("new york", 0.08875),
    ("london", 0.20),
    ("paris", 0.20),
    ("dubai", 0.05),
    ("singapore", 0.09),
];

pub fn lookup_tax_rate(pickup_location: &str) -> f64 {
    let normalized = pickup_location.to_lowercase();
    REGION_TAX_RATES
        .iter()
        .find(|(region, _)| normalized.contains(region))
        .map(|(_, rate)| *rate)
        .unwrap_or(DEFAULT_TAX_RATE)
}

/// Full-precision fare components. Rounding happens only at display time
/// via `rounded_total`, so the additive terms never accumulate rounding
/// error.
#[derive(Debug, Clone, Serialize)]
pub struct FareBreakdown {
    pub base_fare: f64,
    pub distance_fare: f64,
    pub time_fare: f64,
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax: f64,
    pub platform_fee: f64,
    pub total: f64,
    pub driver_payout: f64,
}

impl FareBreakdown {
    pub fn rounded_total(&self) -> f64 {
        (self.total * 100.0).round() / 100.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FareInputs {
    pub distance_km: f64,
    pub duration_days: u32,
    pub duration_hours: f64,
}

pub fn estimate(
    service_type: ServiceType,
    rule: &PricingRule,
    inputs: FareInputs,
    pickup_location: &str,
) -> Result<FareBreakdown, AppError> {
    estimate_with_locator(service_type, rule, inputs, pickup_location, lookup_tax_rate)
}

pub fn estimate_with_locator<F>(
    service_type: ServiceType,
    rule: &PricingRule,
    inputs: FareInputs,
    pickup_location: &str,
    tax_locator: F,
) -> Result<FareBreakdown, AppError>
where
    F: Fn(&str) -> f64,
{
    if inputs.distance_km < 0.0 {
        return Err(AppError::Validation("distance_km must be >= 0".to_string()));
    }
    if inputs.duration_hours < 0.0 {
        return Err(AppError::Validation(
            "duration_hours must be >= 0".to_string(),
        ));
    }
    rule.validate().map_err(AppError::Validation)?;

    let (base_fare, distance_fare, time_fare) = match service_type {
        ServiceType::HourlyCharter => {
            let effective_hours = inputs.duration_hours.max(rule.minimum_billable_hours);
            let time_fare = inputs.duration_days as f64 * effective_hours * rule.hourly_rate;
            (0.0, 0.0, time_fare)
        }
        ServiceType::PointToPoint => {
            let distance_fare = inputs.distance_km * rule.per_distance_unit_rate;
            (rule.base_fare_p2p, distance_fare, 0.0)
        }
    };

    let subtotal = base_fare + distance_fare + time_fare;
    let tax_rate = tax_locator(pickup_location);
    let tax = subtotal * tax_rate;
    let platform_fee = subtotal * PLATFORM_FEE_RATE;

    Ok(FareBreakdown {
        base_fare,
        distance_fare,
        time_fare,
        subtotal,
        tax_rate,
        tax,
        platform_fee,
        total: subtotal + tax + platform_fee,
        driver_payout: subtotal * rule.driver_commission_fraction,
    })
}
