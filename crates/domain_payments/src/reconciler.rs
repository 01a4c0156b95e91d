//! Invoice reconciliation
//!
//! The reconciler is the only code that changes an invoice's paid amount or
//! status. It works on values: the caller persists the updated invoice
//! together with the order transition in one transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{GatewayOrderId, GatewayPaymentId, InvoiceId, Money, PaymentId, PaymentOrderId, ReceiptId};

use crate::error::{PaymentError, PaymentResult};
use crate::invoice::{Invoice, InvoiceStatus};
use crate::order::PaymentOrder;
use crate::payment::{Payment, PaymentMethod};

/// Receipt issued for one settled payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    /// Time-based number with a random suffix, e.g. `RCP-20240301101500-4F2A9C`
    pub receipt_number: String,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub order_id: PaymentOrderId,
    pub gateway_order_id: GatewayOrderId,
    pub payment_id: PaymentId,
    pub gateway_payment_id: GatewayPaymentId,
    pub method: PaymentMethod,
    /// Amount paid in this transaction
    pub amount_paid: Money,
    /// Amount paid before this transaction
    pub previously_paid: Money,
    /// Balance left after this transaction
    pub remaining_balance: Money,
    pub total_amount: Money,
    pub is_fully_paid: bool,
    pub issued_at: DateTime<Utc>,
}

/// Applies confirmed payments to invoices
pub struct InvoiceReconciler;

impl InvoiceReconciler {
    /// Returns the invoice with `amount` credited
    ///
    /// Fails without changing anything if the invoice cannot take a payment
    /// or the credit would exceed the invoice total.
    pub fn apply_payment(invoice: &Invoice, amount: Money) -> PaymentResult<Invoice> {
        if !amount.is_positive() {
            return Err(PaymentError::validation("payment amount must be positive"));
        }
        if matches!(invoice.status, InvoiceStatus::Cancelled | InvoiceStatus::Draft) {
            return Err(PaymentError::invalid_state(format!(
                "invoice {} is {} and cannot be credited",
                invoice.invoice_number, invoice.status
            )));
        }

        let paid = invoice.paid_amount.checked_add(&amount)?;
        if paid.compare(&invoice.total_amount)? == std::cmp::Ordering::Greater {
            return Err(PaymentError::validation(format!(
                "credit of {} would take invoice {} past its total {}",
                amount, invoice.invoice_number, invoice.total_amount
            )));
        }

        let now = Utc::now();
        let mut updated = invoice.clone();
        updated.paid_amount = paid;
        updated.updated_at = now;
        if updated.is_fully_paid() {
            updated.status = InvoiceStatus::Paid;
            updated.paid_at = Some(now);
        } else {
            updated.status = InvoiceStatus::PartiallyPaid;
        }
        Ok(updated)
    }

    /// Builds the receipt for a settlement
    pub fn receipt(before: &Invoice, after: &Invoice, order: &PaymentOrder, payment: &Payment) -> PaymentResult<Receipt> {
        let gateway_payment_id = payment
            .transaction_id
            .clone()
            .ok_or_else(|| PaymentError::validation("settled payment has no gateway payment id"))?;

        Ok(Receipt {
            id: ReceiptId::new(),
            receipt_number: generate_receipt_number(payment.created_at),
            invoice_id: after.id,
            invoice_number: after.invoice_number.clone(),
            order_id: order.id,
            gateway_order_id: order.gateway_order_id.clone(),
            payment_id: payment.id,
            gateway_payment_id,
            method: payment.method,
            amount_paid: payment.amount,
            previously_paid: before.paid_amount,
            remaining_balance: after.remaining_amount()?,
            total_amount: after.total_amount,
            is_fully_paid: after.is_fully_paid(),
            issued_at: payment.created_at,
        })
    }
}

/// Generates a unique receipt number
fn generate_receipt_number(at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("RCP-{}-{}", at.format("%Y%m%d%H%M%S"), &suffix[..6])
}
