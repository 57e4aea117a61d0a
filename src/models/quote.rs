use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorQuote {
    pub id: Uuid,
    pub request_id: Uuid,
    pub tenant_id: Uuid,
    pub operator_id: Uuid,
    pub vehicle_id: Uuid,
    pub price: f64,
    pub eta_minutes: u32,
    pub operator_rating: f64,
    pub notes: Option<String>,
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OperatorQuote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == QuoteStatus::Pending && now > self.expires_at
    }
}

/// Marketplace listing entry: the quote plus the computed lowest-price
/// marker. Presentation hint only, acceptance is not constrained by it.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteListing {
    #[serde(flatten)]
    pub quote: OperatorQuote,
    pub best_value: bool,
}
