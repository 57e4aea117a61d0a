use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleCategory {
    Sedan,
    Suv,
    Van,
    Limousine,
    Coach,
}

/// Per-category rate card, tenant-scoped. Updates overwrite in place, no
/// history is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRule {
    pub tenant_id: Uuid,
    pub category: VehicleCategory,
    pub hourly_rate: f64,
    pub base_fare_p2p: f64,
    pub per_distance_unit_rate: f64,
    pub minimum_billable_hours: f64,
    pub driver_commission_fraction: f64,
    pub updated_at: DateTime<Utc>,
}

impl PricingRule {
    pub fn standard(tenant_id: Uuid, category: VehicleCategory) -> Self {
        let (hourly_rate, base_fare_p2p, per_distance_unit_rate) = match category {
            VehicleCategory::Sedan => (60.0, 25.0, 1.8),
            VehicleCategory::Suv => (80.0, 35.0, 2.2),
            VehicleCategory::Van => (90.0, 40.0, 2.5),
            VehicleCategory::Limousine => (140.0, 75.0, 3.5),
            VehicleCategory::Coach => (120.0, 60.0, 3.0),
        };

        Self {
            tenant_id,
            category,
            hourly_rate,
            base_fare_p2p,
            per_distance_unit_rate,
            minimum_billable_hours: 2.0,
            driver_commission_fraction: 0.75,
            updated_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.hourly_rate < 0.0
            || self.base_fare_p2p < 0.0
            || self.per_distance_unit_rate < 0.0
            || self.minimum_billable_hours < 0.0
        {
            return Err("rates must be non-negative".to_string());
        }
        if !(0.0..=1.0).contains(&self.driver_commission_fraction) {
            return Err("driver_commission_fraction must be within [0, 1]".to_string());
        }
        Ok(())
    }
}
