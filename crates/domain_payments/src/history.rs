//! Read-only views over invoices and payment records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{Currency, InvoiceId, Money};

use crate::error::PaymentResult;
use crate::invoice::{Invoice, InvoiceStatus};
use crate::payment::{Payment, PaymentMethod, PaymentStatus, RefundRecord};

/// Payment state of one invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStatusView {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub invoice_status: InvoiceStatus,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub remaining_amount: Money,
    /// True if a `CREATED` order is open for the invoice
    pub has_pending_order: bool,
    pub is_fully_paid: bool,
}

impl PaymentStatusView {
    pub fn from_invoice(invoice: &Invoice, has_pending_order: bool) -> PaymentResult<Self> {
        Ok(Self {
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number.clone(),
            invoice_status: invoice.status,
            total_amount: invoice.total_amount,
            paid_amount: invoice.paid_amount,
            remaining_amount: invoice.remaining_amount()?,
            has_pending_order,
            is_fully_paid: invoice.is_fully_paid(),
        })
    }
}

/// Aggregates over payment and refund records in one currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStats {
    pub currency: Currency,
    pub completed_count: u64,
    pub failed_count: u64,
    pub total_collected: Money,
    pub total_refunded: Money,
    /// Completed payments per method
    pub by_method: BTreeMap<PaymentMethod, u64>,
}

impl PaymentStats {
    /// Folds records into totals, skipping records in other currencies
    pub fn aggregate(currency: Currency, payments: &[Payment], refunds: &[RefundRecord]) -> PaymentResult<Self> {
        let mut stats = Self {
            currency,
            completed_count: 0,
            failed_count: 0,
            total_collected: Money::zero(currency),
            total_refunded: Money::zero(currency),
            by_method: BTreeMap::new(),
        };

        for payment in payments.iter().filter(|p| p.amount.currency() == currency) {
            match payment.status {
                PaymentStatus::Completed => {
                    stats.completed_count += 1;
                    stats.total_collected = stats.total_collected.checked_add(&payment.amount)?;
                    *stats.by_method.entry(payment.method).or_insert(0) += 1;
                }
                PaymentStatus::Failed => stats.failed_count += 1,
                PaymentStatus::Pending => {}
            }
        }

        for refund in refunds.iter().filter(|r| r.amount.currency() == currency) {
            stats.total_refunded = stats.total_refunded.checked_add(&refund.amount)?;
        }

        Ok(stats)
    }

    /// Collected minus refunded
    pub fn net_collected(&self) -> PaymentResult<Money> {
        Ok(self.total_collected.checked_sub(&self.total_refunded)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_kernel::{GatewayPaymentId, GatewayRefundId, PaymentOrderId, RefundRecordId};

    use crate::payment::RefundSpeed;

    fn inr(minor: i64) -> Money {
        Money::from_minor(minor, Currency::INR).unwrap()
    }

    fn completed(amount: Money, method: PaymentMethod) -> Payment {
        Payment::completed(
            InvoiceId::new(),
            PaymentOrderId::new(),
            amount,
            method,
            GatewayPaymentId::new("pay_x"),
        )
    }

    fn refund(amount: Money) -> RefundRecord {
        RefundRecord {
            id: RefundRecordId::new(),
            order_id: PaymentOrderId::new(),
            invoice_id: InvoiceId::new(),
            gateway_refund_id: GatewayRefundId::new("rfnd_x"),
            gateway_payment_id: GatewayPaymentId::new("pay_x"),
            amount,
            speed: RefundSpeed::Normal,
            status: "processed".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_aggregate_counts_and_totals() {
        let payments = vec![
            completed(inr(200_000), PaymentMethod::Upi),
            completed(inr(300_000), PaymentMethod::Card),
            completed(inr(50_000), PaymentMethod::Upi),
            Payment::failed(InvoiceId::new(), PaymentOrderId::new(), inr(10_000), None, "declined"),
        ];
        let refunds = vec![refund(inr(20_000))];

        let stats = PaymentStats::aggregate(Currency::INR, &payments, &refunds).unwrap();
        assert_eq!(stats.completed_count, 3);
        assert_eq!(stats.failed_count, 1);
        assert_eq!(stats.total_collected, inr(550_000));
        assert_eq!(stats.total_refunded, inr(20_000));
        assert_eq!(stats.net_collected().unwrap(), inr(530_000));
        assert_eq!(stats.by_method.get(&PaymentMethod::Upi), Some(&2));
        assert_eq!(stats.by_method.get(&PaymentMethod::Card), Some(&1));
    }

    #[test]
    fn test_other_currencies_are_skipped() {
        let usd = Money::from_minor(1_000, Currency::USD).unwrap();
        let stats = PaymentStats::aggregate(
            Currency::INR,
            &[completed(usd, PaymentMethod::Card)],
            &[refund(usd)],
        )
        .unwrap();
        assert_eq!(stats.completed_count, 0);
        assert!(stats.total_collected.is_zero());
        assert!(stats.total_refunded.is_zero());
    }

    #[test]
    fn test_status_view_for_partial_invoice() {
        let mut invoice = Invoice::new("INV-2024-0001", inr(500_000));
        invoice.paid_amount = inr(200_000);
        invoice.status = InvoiceStatus::PartiallyPaid;

        let view = PaymentStatusView::from_invoice(&invoice, true).unwrap();
        assert_eq!(view.remaining_amount, inr(300_000));
        assert!(view.has_pending_order);
        assert!(!view.is_fully_paid);
    }
}
