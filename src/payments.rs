use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;

/// Payment-gateway seam. Pre-authorization happens at quote acceptance,
/// capture at billing, refund intent on post-acceptance cancellation.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn preauthorize(&self, amount: f64) -> Result<String, AppError>;
    async fn capture(&self, transaction_ref: &str, final_amount: f64) -> Result<(), AppError>;
    async fn refund(&self, transaction_ref: &str, amount: f64, reason: &str)
        -> Result<(), AppError>;
}

/// Default gateway: records intent in the log and always succeeds. Stands
/// in until a real processor integration is wired up.
pub struct LoggingGateway;

#[async_trait]
impl PaymentGateway for LoggingGateway {
    async fn preauthorize(&self, amount: f64) -> Result<String, AppError> {
        let transaction_ref = format!("txn-{}", Uuid::new_v4());
        info!(%transaction_ref, amount, "payment pre-authorized");
        Ok(transaction_ref)
    }

    async fn capture(&self, transaction_ref: &str, final_amount: f64) -> Result<(), AppError> {
        info!(transaction_ref, final_amount, "payment captured");
        Ok(())
    }

    async fn refund(
        &self,
        transaction_ref: &str,
        amount: f64,
        reason: &str,
    ) -> Result<(), AppError> {
        info!(transaction_ref, amount, reason, "refund requested");
        Ok(())
    }
}
