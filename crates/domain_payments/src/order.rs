//! Payment order aggregate
//!
//! A `PaymentOrder` is a gateway-tracked intent to collect one amount against
//! one invoice. Its status only moves along the transition table in
//! [`OrderStatus::can_transition_to`]; every write goes through the store's
//! version check so concurrent callbacks cannot both apply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{
    Currency, GatewayOrderId, GatewayPaymentId, InvoiceId, Money, PaymentOrderId,
};

use crate::error::{PaymentError, PaymentResult};
use crate::payment::PaymentMethod;

/// Reason recorded when a callback signature does not verify
pub const SIGNATURE_INVALID: &str = "SIGNATURE_INVALID";

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created at the gateway, awaiting payment
    Created,
    /// Payment captured and reconciled
    Paid,
    /// Payment failed or the callback was rejected
    Failed,
    /// No confirmed payment before `expires_at`
    Expired,
    /// Entire paid amount refunded
    Refunded,
    /// Part of the paid amount refunded
    PartiallyRefunded,
}

impl OrderStatus {
    /// Checks if a status transition is allowed
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, Paid)
                | (Created, Failed)
                | (Created, Expired)
                | (Paid, Refunded)
                | (Paid, PartiallyRefunded)
                | (PartiallyRefunded, PartiallyRefunded)
                | (PartiallyRefunded, Refunded)
        )
    }

    /// True once an order can no longer accept a payment
    pub fn is_terminal_for_payment(&self) -> bool {
        !matches!(self, OrderStatus::Created)
    }

    /// True if refunds may still be issued against the order
    pub fn is_refundable(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::PartiallyRefunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Refunded => "REFUNDED",
            OrderStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(OrderStatus::Created),
            "PAID" => Ok(OrderStatus::Paid),
            "FAILED" => Ok(OrderStatus::Failed),
            "EXPIRED" => Ok(OrderStatus::Expired),
            "REFUNDED" => Ok(OrderStatus::Refunded),
            "PARTIALLY_REFUNDED" => Ok(OrderStatus::PartiallyRefunded),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Method metadata captured from the gateway at settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodDetails {
    pub method: PaymentMethod,
    pub bank: Option<String>,
    pub wallet: Option<String>,
    pub vpa: Option<String>,
    /// Gateway fee deducted from the payment
    pub fee: Option<Money>,
    /// Tax charged on the gateway fee
    pub tax: Option<Money>,
}

/// A gateway-tracked payment order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrder {
    /// Internal identifier
    pub id: PaymentOrderId,
    /// Gateway-assigned order id, immutable once created
    pub gateway_order_id: GatewayOrderId,
    /// Invoice this order pays toward
    pub invoice_id: InvoiceId,
    /// Amount requested
    pub amount: Money,
    /// Amount captured
    pub amount_paid: Money,
    /// Amount refunded so far
    pub amount_refunded: Money,
    pub status: OrderStatus,
    /// Receipt reference sent to the gateway at creation
    pub receipt: String,
    pub gateway_payment_id: Option<GatewayPaymentId>,
    /// Callback signature, stored from the first verified callback only
    pub signature: Option<String>,
    pub signature_verified: bool,
    pub method_details: Option<PaymentMethodDetails>,
    /// Last payment status reported by the gateway
    pub gateway_status: Option<String>,
    pub failure_code: Option<String>,
    pub failure_reason: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version, bumped by the store on every write
    pub version: i64,
}

impl PaymentOrder {
    /// Creates a new order in `CREATED`
    pub fn new(
        invoice_id: InvoiceId,
        gateway_order_id: GatewayOrderId,
        amount: Money,
        receipt: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        let zero = Money::zero(amount.currency());
        Self {
            id: PaymentOrderId::new(),
            gateway_order_id,
            invoice_id,
            amount,
            amount_paid: zero,
            amount_refunded: zero,
            status: OrderStatus::Created,
            receipt: receipt.into(),
            gateway_payment_id: None,
            signature: None,
            signature_verified: false,
            method_details: None,
            gateway_status: None,
            failure_code: None,
            failure_reason: None,
            expires_at,
            paid_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn currency(&self) -> Currency {
        self.amount.currency()
    }

    /// Moves to `next` if the transition table allows it
    pub fn transition_to(&mut self, next: OrderStatus) -> PaymentResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(PaymentError::invalid_state(format!(
                "order {} cannot move from {} to {}",
                self.gateway_order_id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// True if the order is still awaiting payment past its expiry
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Created && self.expires_at < now
    }

    /// Stores the callback signature unless one was already recorded
    pub fn record_signature(&mut self, signature: Option<&str>, verified: bool) {
        if self.signature.is_none() && !self.signature_verified {
            self.signature = signature.map(str::to_string);
            self.signature_verified = verified;
        }
    }

    /// Applies a captured payment
    pub fn mark_paid(
        &mut self,
        payment_id: GatewayPaymentId,
        amount: Money,
        details: PaymentMethodDetails,
    ) -> PaymentResult<()> {
        if amount.compare(&self.amount)? == std::cmp::Ordering::Greater {
            return Err(PaymentError::validation(format!(
                "captured {} exceeds order amount {}",
                amount, self.amount
            )));
        }
        self.transition_to(OrderStatus::Paid)?;
        self.amount_paid = amount;
        self.gateway_payment_id = Some(payment_id);
        self.method_details = Some(details);
        self.gateway_status = Some("captured".to_string());
        self.paid_at = Some(self.updated_at);
        Ok(())
    }

    /// Records a failure and moves to `FAILED`
    pub fn mark_failed(&mut self, code: impl Into<String>, reason: impl Into<String>) -> PaymentResult<()> {
        self.transition_to(OrderStatus::Failed)?;
        self.failure_code = Some(code.into());
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Amount still available for refund
    pub fn refundable_amount(&self) -> PaymentResult<Money> {
        Ok(self.amount_paid.checked_sub(&self.amount_refunded)?)
    }

    /// Books a refund and sets `REFUNDED` or `PARTIALLY_REFUNDED`
    pub fn apply_refund(&mut self, amount: Money) -> PaymentResult<()> {
        if !amount.is_positive() {
            return Err(PaymentError::validation("refund amount must be positive"));
        }
        let refundable = self.refundable_amount()?;
        if amount.compare(&refundable)? == std::cmp::Ordering::Greater {
            return Err(PaymentError::validation(format!(
                "refund {} exceeds refundable balance {}",
                amount, refundable
            )));
        }
        let refunded = self.amount_refunded.checked_add(&amount)?;
        let next = if refunded == self.amount_paid {
            OrderStatus::Refunded
        } else {
            OrderStatus::PartiallyRefunded
        };
        self.transition_to(next)?;
        self.amount_refunded = refunded;
        Ok(())
    }
}
