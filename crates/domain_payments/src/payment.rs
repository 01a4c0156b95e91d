//! Payment ledger records
//!
//! `Payment` rows are append-only: one is written when an order settles or
//! fails, and it is never changed afterwards. Refunds get their own
//! `RefundRecord` rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{
    GatewayPaymentId, GatewayRefundId, InvoiceId, Money, PaymentId, PaymentOrderId, RefundRecordId,
};

/// Payment method as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Upi,
    Wallet,
    NetBanking,
    Emi,
    /// Method not reported or not recognised
    Unknown,
}

impl PaymentMethod {
    /// Maps the gateway's method string
    pub fn from_gateway(method: &str) -> Self {
        match method.to_ascii_lowercase().as_str() {
            "card" => PaymentMethod::Card,
            "upi" => PaymentMethod::Upi,
            "wallet" => PaymentMethod::Wallet,
            "netbanking" | "net_banking" => PaymentMethod::NetBanking,
            "emi" | "cardless_emi" => PaymentMethod::Emi,
            _ => PaymentMethod::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::NetBanking => "net_banking",
            PaymentMethod::Emi => "emi",
            PaymentMethod::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_gateway(s))
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Payment is being processed
    Pending,
    /// Payment completed successfully
    Completed,
    /// Payment failed
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// A payment ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier
    pub id: PaymentId,
    /// Invoice being paid
    pub invoice_id: InvoiceId,
    /// Order the payment was made against
    pub order_id: PaymentOrderId,
    /// Payment amount
    pub amount: Money,
    /// Payment method
    pub method: PaymentMethod,
    /// Status
    pub status: PaymentStatus,
    /// Gateway payment id
    pub transaction_id: Option<GatewayPaymentId>,
    /// Gateway error code and description for failed payments
    pub failure_reason: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Record for a captured payment
    pub fn completed(
        invoice_id: InvoiceId,
        order_id: PaymentOrderId,
        amount: Money,
        method: PaymentMethod,
        transaction_id: GatewayPaymentId,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            invoice_id,
            order_id,
            amount,
            method,
            status: PaymentStatus::Completed,
            transaction_id: Some(transaction_id),
            failure_reason: None,
            created_at: Utc::now(),
        }
    }

    /// Audit record for a failed attempt
    pub fn failed(
        invoice_id: InvoiceId,
        order_id: PaymentOrderId,
        amount: Money,
        transaction_id: Option<GatewayPaymentId>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            invoice_id,
            order_id,
            amount,
            method: PaymentMethod::Unknown,
            status: PaymentStatus::Failed,
            transaction_id,
            failure_reason: Some(reason.into()),
            created_at: Utc::now(),
        }
    }
}

/// Refund processing speed requested from the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundSpeed {
    #[default]
    Normal,
    Optimum,
}

impl RefundSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundSpeed::Normal => "normal",
            RefundSpeed::Optimum => "optimum",
        }
    }
}

impl FromStr for RefundSpeed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(RefundSpeed::Normal),
            "optimum" => Ok(RefundSpeed::Optimum),
            other => Err(format!("unknown refund speed: {}", other)),
        }
    }
}

/// A refund accepted by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub id: RefundRecordId,
    pub order_id: PaymentOrderId,
    pub invoice_id: InvoiceId,
    pub gateway_refund_id: GatewayRefundId,
    pub gateway_payment_id: GatewayPaymentId,
    pub amount: Money,
    pub speed: RefundSpeed,
    /// Status string reported by the gateway
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;

    #[test]
    fn test_method_mapping() {
        assert_eq!(PaymentMethod::from_gateway("UPI"), PaymentMethod::Upi);
        assert_eq!(PaymentMethod::from_gateway("netbanking"), PaymentMethod::NetBanking);
        assert_eq!(PaymentMethod::from_gateway("paylater"), PaymentMethod::Unknown);
    }

    #[test]
    fn test_failed_record_keeps_reason() {
        let amount = Money::from_minor(10_000, Currency::INR).unwrap();
        let payment = Payment::failed(
            InvoiceId::new(),
            PaymentOrderId::new(),
            amount,
            None,
            "BAD_REQUEST_ERROR: card declined",
        );
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("BAD_REQUEST_ERROR: card declined"));
        assert!(payment.transaction_id.is_none());
    }
}
