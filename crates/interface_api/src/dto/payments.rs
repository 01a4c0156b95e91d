//! Payment DTOs
//!
//! Amounts cross the API in major units (`"2000.00"` rupees) and are
//! converted to exact minor units before reaching the domain.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use core_kernel::{Currency, Money};
use domain_payments::{
    CheckoutSession, CustomerContact, FailureReport, Payment, PaymentOrder, PaymentStats, PaymentStatusView,
    Receipt, RefundOutcome, RefundSpeed, WebhookOutcome,
};

use crate::error::ApiError;

fn positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_positive() && !amount.is_zero() {
        Ok(())
    } else {
        Err(ValidationError::new("amount_must_be_positive"))
    }
}

/// Parses a request amount in `currency`, or `default` if none is named
pub fn to_money(amount: Decimal, currency: Option<&str>, default: Currency) -> Result<Money, ApiError> {
    let currency = match currency {
        Some(code) => Currency::from_str(code).map_err(|e| ApiError::Validation(e.to_string()))?,
        None => default,
    };
    Money::from_major(amount, currency).map_err(|e| ApiError::Validation(e.to_string()))
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CustomerDto {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 6, max = 20))]
    pub phone: Option<String>,
}

impl From<CustomerDto> for CustomerContact {
    fn from(dto: CustomerDto) -> Self {
        CustomerContact {
            name: dto.name,
            email: dto.email,
            phone: dto.phone,
        }
    }
}

/// Body of `POST /invoices/:id/payments`
#[derive(Debug, Default, Deserialize, Validate)]
pub struct InitiatePaymentRequest {
    /// Partial amount; the remaining balance when omitted
    #[validate(custom(function = "positive_amount"))]
    pub amount: Option<Decimal>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[validate(nested)]
    pub customer: Option<CustomerDto>,
}

/// Body of `POST /invoices/:id/payments/retry`
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RetryPaymentRequest {
    #[validate(nested)]
    pub customer: Option<CustomerDto>,
}

/// Checkout success callback as forwarded by the client
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentSuccessRequest {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[validate(length(min = 1))]
    pub payment_id: String,
    #[validate(length(min = 1))]
    pub signature: String,
}

/// Checkout failure callback as forwarded by the client
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentFailureRequest {
    #[validate(length(min = 1))]
    pub order_id: String,
    pub payment_id: Option<String>,
    #[validate(length(min = 1))]
    pub error_code: String,
    pub error_description: String,
    pub error_reason: Option<String>,
}

impl PaymentFailureRequest {
    pub fn report(&self) -> FailureReport {
        FailureReport {
            error_code: self.error_code.clone(),
            error_description: self.error_description.clone(),
            error_reason: self.error_reason.clone(),
        }
    }
}

/// Body of `POST /payments/:payment_id/refunds`
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RefundRequest {
    /// Partial refund; everything still refundable when omitted
    #[validate(custom(function = "positive_amount"))]
    pub amount: Option<Decimal>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[serde(default)]
    pub speed: RefundSpeed,
}

/// Query of `GET /payments/stats`
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub invoice_id: Option<Uuid>,
    pub currency: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub invoice_id: Uuid,
    /// Gateway order id to open checkout with
    pub order_id: String,
    pub amount_to_pay: Decimal,
    pub amount_minor: i64,
    pub currency: String,
    pub is_partial: bool,
    pub expires_at: DateTime<Utc>,
    pub key_id: String,
    pub reused: bool,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            invoice_id: *session.invoice_id.as_uuid(),
            order_id: session.gateway_order_id.to_string(),
            amount_to_pay: session.amount_to_pay.to_major(),
            amount_minor: session.amount_to_pay.minor_units(),
            currency: session.currency.code().to_string(),
            is_partial: session.is_partial,
            expires_at: session.expires_at,
            key_id: session.key_id,
            reused: session.reused,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiptResponse {
    pub receipt_number: String,
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub order_id: String,
    pub payment_id: String,
    pub method: String,
    pub currency: String,
    pub amount_paid: Decimal,
    pub previously_paid: Decimal,
    pub remaining_balance: Decimal,
    pub total_amount: Decimal,
    pub is_fully_paid: bool,
    pub issued_at: DateTime<Utc>,
}

impl From<Receipt> for ReceiptResponse {
    fn from(receipt: Receipt) -> Self {
        Self {
            receipt_number: receipt.receipt_number,
            invoice_id: *receipt.invoice_id.as_uuid(),
            invoice_number: receipt.invoice_number,
            order_id: receipt.gateway_order_id.to_string(),
            payment_id: receipt.gateway_payment_id.to_string(),
            method: receipt.method.to_string(),
            currency: receipt.amount_paid.currency().code().to_string(),
            amount_paid: receipt.amount_paid.to_major(),
            previously_paid: receipt.previously_paid.to_major(),
            remaining_balance: receipt.remaining_balance.to_major(),
            total_amount: receipt.total_amount.to_major(),
            is_fully_paid: receipt.is_fully_paid,
            issued_at: receipt.issued_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub invoice_id: Uuid,
    pub status: String,
    pub amount: Decimal,
    pub currency: String,
    pub failure_code: Option<String>,
    pub failure_reason: Option<String>,
}

impl From<PaymentOrder> for OrderResponse {
    fn from(order: PaymentOrder) -> Self {
        Self {
            order_id: order.gateway_order_id.to_string(),
            invoice_id: *order.invoice_id.as_uuid(),
            status: order.status.to_string(),
            amount: order.amount.to_major(),
            currency: order.currency().code().to_string(),
            failure_code: order.failure_code,
            failure_reason: order.failure_reason,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub invoice_status: String,
    pub currency: String,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub has_pending_order: bool,
    pub is_fully_paid: bool,
}

impl From<PaymentStatusView> for PaymentStatusResponse {
    fn from(view: PaymentStatusView) -> Self {
        Self {
            invoice_id: *view.invoice_id.as_uuid(),
            invoice_number: view.invoice_number,
            invoice_status: view.invoice_status.to_string(),
            currency: view.total_amount.currency().code().to_string(),
            total_amount: view.total_amount.to_major(),
            paid_amount: view.paid_amount.to_major(),
            remaining_amount: view.remaining_amount.to_major(),
            has_pending_order: view.has_pending_order,
            is_fully_paid: view.is_fully_paid,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentRecordResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Payment> for PaymentRecordResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: *payment.id.as_uuid(),
            order_id: *payment.order_id.as_uuid(),
            amount: payment.amount.to_major(),
            currency: payment.amount.currency().code().to_string(),
            method: payment.method.to_string(),
            status: payment.status.as_str().to_string(),
            transaction_id: payment.transaction_id.map(|id| id.to_string()),
            failure_reason: payment.failure_reason,
            created_at: payment.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefundResponse {
    pub refund_id: String,
    pub status: String,
    pub amount: Decimal,
    pub currency: String,
    pub order_status: String,
    pub refundable_remaining: Decimal,
}

impl TryFrom<RefundOutcome> for RefundResponse {
    type Error = ApiError;

    fn try_from(outcome: RefundOutcome) -> Result<Self, Self::Error> {
        let remaining = outcome.order.refundable_amount()?;
        Ok(Self {
            refund_id: outcome.refund.gateway_refund_id.to_string(),
            status: outcome.refund.status,
            amount: outcome.refund.amount.to_major(),
            currency: outcome.refund.amount.currency().code().to_string(),
            order_status: outcome.order.status.to_string(),
            refundable_remaining: remaining.to_major(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentStatsResponse {
    pub currency: String,
    pub completed_count: u64,
    pub failed_count: u64,
    pub total_collected: Decimal,
    pub total_refunded: Decimal,
    pub net_collected: Decimal,
    pub by_method: BTreeMap<String, u64>,
}

impl TryFrom<PaymentStats> for PaymentStatsResponse {
    type Error = ApiError;

    fn try_from(stats: PaymentStats) -> Result<Self, Self::Error> {
        let net = stats.net_collected()?;
        Ok(Self {
            currency: stats.currency.code().to_string(),
            completed_count: stats.completed_count,
            failed_count: stats.failed_count,
            total_collected: stats.total_collected.to_major(),
            total_refunded: stats.total_refunded.to_major(),
            net_collected: net.to_major(),
            by_method: stats
                .by_method
                .into_iter()
                .map(|(method, count)| (method.to_string(), count))
                .collect(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
}

impl From<WebhookOutcome> for WebhookResponse {
    fn from(outcome: WebhookOutcome) -> Self {
        let (name, receipt_number) = match outcome {
            WebhookOutcome::Settled(receipt) => ("settled", Some(receipt.receipt_number)),
            WebhookOutcome::Duplicate(receipt) => ("duplicate", Some(receipt.receipt_number)),
            WebhookOutcome::FailureRecorded => ("failure_recorded", None),
            WebhookOutcome::Acknowledged => ("acknowledged", None),
        };
        Self {
            status: "ok".to_string(),
            outcome: name.to_string(),
            receipt_number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_money_uses_default_currency() {
        let money = to_money(dec!(2000.00), None, Currency::INR).unwrap();
        assert_eq!(money.minor_units(), 200_000);
        assert_eq!(money.currency(), Currency::INR);
    }

    #[test]
    fn test_to_money_rejects_sub_paise_amounts() {
        assert!(matches!(
            to_money(dec!(10.005), Some("INR"), Currency::INR),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_to_money_rejects_unknown_currency() {
        assert!(matches!(
            to_money(dec!(10), Some("XYZ"), Currency::INR),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_initiate_request_validation() {
        let ok = InitiatePaymentRequest {
            amount: Some(dec!(2000)),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let zero = InitiatePaymentRequest {
            amount: Some(Decimal::ZERO),
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let bad_email = InitiatePaymentRequest {
            customer: Some(CustomerDto {
                email: Some("not-an-email".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(bad_email.validate().is_err());
    }
}
