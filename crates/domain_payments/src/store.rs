//! Persistence port for orders, payments, refunds and receipts
//!
//! Every order write is a compare-and-set on `PaymentOrder::version`: the
//! store accepts the write only if the stored version still equals the
//! version the caller read, and answers `PortError::Conflict` otherwise.
//! Implementations must make `commit_settlement` atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{
    Currency, DomainPort, GatewayOrderId, GatewayPaymentId, InvoiceId, PaymentOrderId, PortError,
};

use crate::invoice::Invoice;
use crate::order::PaymentOrder;
use crate::payment::{Payment, RefundRecord};
use crate::reconciler::Receipt;

/// Result of inserting a new `CREATED` order
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The order was stored
    Inserted(PaymentOrder),
    /// Another `CREATED` order already exists for the invoice
    Existing(PaymentOrder),
}

/// Everything written when a payment settles
#[derive(Debug, Clone)]
pub struct Settlement {
    /// Order in `PAID`, carrying the version that was read
    pub order: PaymentOrder,
    pub payment: Payment,
    /// Invoice after the credit; `receipt.previously_paid` is the amount it was read with
    pub invoice: Invoice,
    pub receipt: Receipt,
}

/// Filter for payment and refund listings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentQuery {
    pub invoice_id: Option<InvoiceId>,
    pub currency: Option<Currency>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl PaymentQuery {
    pub fn for_invoice(invoice_id: InvoiceId) -> Self {
        Self {
            invoice_id: Some(invoice_id),
            ..Default::default()
        }
    }

    /// True if a record with these attributes passes the filter
    pub fn matches(&self, invoice_id: InvoiceId, currency: Currency, at: DateTime<Utc>) -> bool {
        self.invoice_id.map_or(true, |id| id == invoice_id)
            && self.currency.map_or(true, |c| c == currency)
            && self.from.map_or(true, |from| at >= from)
            && self.to.map_or(true, |to| at < to)
    }
}

/// Store for payment orders and their ledger records
#[async_trait]
pub trait PaymentStore: DomainPort {
    /// Inserts a `CREATED` order unless the invoice already has one
    async fn insert_order(&self, order: PaymentOrder) -> Result<InsertOutcome, PortError>;

    async fn find_order(&self, id: PaymentOrderId) -> Result<PaymentOrder, PortError>;

    async fn find_order_by_gateway_id(&self, gateway_order_id: &GatewayOrderId) -> Result<PaymentOrder, PortError>;

    async fn find_order_by_payment_id(&self, payment_id: &GatewayPaymentId) -> Result<PaymentOrder, PortError>;

    /// The invoice's `CREATED` order, if any
    async fn find_created_order(&self, invoice_id: InvoiceId) -> Result<Option<PaymentOrder>, PortError>;

    /// Version-checked write; returns the stored order with its new version
    async fn update_order(&self, order: &PaymentOrder) -> Result<PaymentOrder, PortError>;

    /// Atomically writes the paid order, payment record, credited invoice and receipt
    async fn commit_settlement(&self, settlement: &Settlement) -> Result<PaymentOrder, PortError>;

    /// Atomically writes the order and a `FAILED` payment record; a gateway
    /// decline leaves the order `CREATED`
    async fn commit_failure(&self, order: &PaymentOrder, payment: &Payment) -> Result<PaymentOrder, PortError>;

    /// Atomically writes the refunded order and the refund record
    async fn commit_refund(&self, order: &PaymentOrder, refund: &RefundRecord) -> Result<PaymentOrder, PortError>;

    /// `CREATED` orders whose expiry is before `now`
    async fn list_expired_orders(&self, now: DateTime<Utc>) -> Result<Vec<PaymentOrder>, PortError>;

    /// Payment records, oldest first
    async fn list_payments(&self, query: &PaymentQuery) -> Result<Vec<Payment>, PortError>;

    /// Refund records, oldest first
    async fn list_refunds(&self, query: &PaymentQuery) -> Result<Vec<RefundRecord>, PortError>;

    async fn find_receipt(&self, order_id: PaymentOrderId) -> Result<Option<Receipt>, PortError>;
}
