//! Payment domain errors

use thiserror::Error;

use core_kernel::{InvoiceId, MoneyError, PortError};

/// Errors that can occur in the payment domain
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Invoice not found in the ledger
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    /// Payment order not found
    #[error("Payment order not found: {0}")]
    OrderNotFound(String),

    /// Payment not found locally or at the gateway
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Operation is not allowed in the current invoice or order state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Input failed validation; nothing was sent to the gateway
    #[error("Validation error: {0}")]
    Validation(String),

    /// Callback or webhook signature did not verify
    #[error("Signature verification failed for {order_id}")]
    SignatureInvalid { order_id: String },

    /// Transient gateway failure that persisted through every retry
    #[error("Payment gateway unavailable: {operation} failed after {attempts} attempts")]
    GatewayUnavailable {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: PortError,
    },

    /// Non-transient error reported by the gateway
    #[error("Payment gateway error: {0}")]
    Gateway(#[source] PortError),

    /// Gateway reports the payment in a state other than captured
    #[error("Payment not captured, gateway status: {status}")]
    PaymentNotCaptured { status: String },

    /// Gateway credentials or flags are missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A concurrent writer changed the record first
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage failure
    #[error("Persistence error: {0}")]
    Persistence(#[source] PortError),

    /// Money arithmetic error
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),
}

impl From<PortError> for PaymentError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Conflict { message } => PaymentError::Conflict(message),
            other => PaymentError::Persistence(other),
        }
    }
}

impl PaymentError {
    pub fn validation(message: impl Into<String>) -> Self {
        PaymentError::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        PaymentError::InvalidState(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        PaymentError::Configuration(message.into())
    }

    /// Returns true for errors raised before any external call was attempted
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PaymentError::InvoiceNotFound(_)
                | PaymentError::OrderNotFound(_)
                | PaymentError::PaymentNotFound(_)
                | PaymentError::InvalidState(_)
                | PaymentError::Validation(_)
                | PaymentError::Money(_)
        )
    }
}

/// Result alias for payment domain operations
pub type PaymentResult<T> = Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_port_error_maps_to_conflict() {
        let err: PaymentError = PortError::conflict("version 3 is stale").into();
        assert!(matches!(err, PaymentError::Conflict(msg) if msg.contains("stale")));
    }

    #[test]
    fn test_other_port_errors_map_to_persistence() {
        let err: PaymentError = PortError::connection("pool closed").into();
        assert!(matches!(err, PaymentError::Persistence(_)));
    }

    #[test]
    fn test_client_errors() {
        assert!(PaymentError::validation("amount").is_client_error());
        assert!(!PaymentError::Configuration("missing key".into()).is_client_error());
    }
}
