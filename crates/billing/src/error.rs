//! Billing error types

use recurbill_shared::DomainError;
use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Payment gateway timed out: {0}")]
    GatewayTimeout(String),

    #[error("Payment gateway rejected request ({status}): {message}")]
    GatewayRejected { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invoice not found or not owned by caller: {0}")]
    InvoiceNotFound(String),

    #[error("Client not found or not owned by caller: {0}")]
    ClientNotFound(String),

    #[error("Subscription not found or not owned by caller: {0}")]
    SubscriptionNotFound(String),

    #[error("Invoice is already paid: {0}")]
    AlreadyPaid(String),

    #[error("Gateway order {0} carries no invoice receipt")]
    MissingReceipt(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job lock error: {0}")]
    Lock(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Transient failures that are safe to retry as a whole request or pass
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::Gateway(_)
                | BillingError::GatewayTimeout(_)
                | BillingError::Database(_)
                | BillingError::Lock(_)
        )
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BillingError::GatewayTimeout(err.to_string())
        } else {
            BillingError::Gateway(err.to_string())
        }
    }
}

impl From<redis::RedisError> for BillingError {
    fn from(err: redis::RedisError) -> Self {
        BillingError::Lock(err.to_string())
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        BillingError::InvalidInput(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BillingError::GatewayTimeout("orders".into()).is_retryable());
        assert!(BillingError::Database("pool closed".into()).is_retryable());
        assert!(!BillingError::AlreadyPaid("inv".into()).is_retryable());
        assert!(!BillingError::GatewayRejected {
            status: 400,
            message: "bad amount".into()
        }
        .is_retryable());
        assert!(!BillingError::InvalidInput("amount".into()).is_retryable());
    }

    #[test]
    fn test_domain_error_maps_to_invalid_input() {
        let err: BillingError = DomainError::MissingField("description").into();
        assert!(matches!(err, BillingError::InvalidInput(ref m) if m.contains("description")));
    }
}
