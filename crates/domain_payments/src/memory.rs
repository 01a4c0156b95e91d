//! In-memory adapter for the invoice ledger and payment store
//!
//! All collections sit behind one lock, so every multi-record commit is
//! atomic and version checks behave like the database adapter's.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use core_kernel::{
    DomainPort, GatewayOrderId, GatewayPaymentId, HealthCheckResult, HealthCheckable, InvoiceId,
    PaymentOrderId, PortError,
};

use crate::invoice::{Invoice, InvoiceLedger};
use crate::order::{OrderStatus, PaymentOrder};
use crate::payment::{Payment, RefundRecord};
use crate::reconciler::Receipt;
use crate::store::{InsertOutcome, PaymentQuery, PaymentStore, Settlement};

#[derive(Debug, Default)]
struct State {
    invoices: HashMap<InvoiceId, Invoice>,
    orders: HashMap<PaymentOrderId, PaymentOrder>,
    payments: Vec<Payment>,
    refunds: Vec<RefundRecord>,
    receipts: HashMap<PaymentOrderId, Receipt>,
}

impl State {
    /// Checks the caller's version and returns the next one
    fn check_version(&self, order: &PaymentOrder) -> Result<i64, PortError> {
        let stored = self
            .orders
            .get(&order.id)
            .ok_or_else(|| PortError::not_found("PaymentOrder", order.id))?;
        if stored.version != order.version {
            return Err(PortError::conflict(format!(
                "order {} is at version {}, write was based on {}",
                order.gateway_order_id, stored.version, order.version
            )));
        }
        Ok(stored.version + 1)
    }

    fn write_order(&mut self, order: &PaymentOrder, version: i64) -> PaymentOrder {
        let mut stored = order.clone();
        stored.version = version;
        self.orders.insert(stored.id, stored.clone());
        stored
    }
}

/// Ledger and store kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    state: RwLock<State>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an invoice, standing in for the billing system
    pub async fn seed_invoice(&self, invoice: Invoice) {
        self.state.write().await.invoices.insert(invoice.id, invoice);
    }

    /// All orders for an invoice, oldest first
    pub async fn orders_for_invoice(&self, invoice_id: InvoiceId) -> Vec<PaymentOrder> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.invoice_id == invoice_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }
}

impl DomainPort for InMemoryPaymentStore {}

#[async_trait]
impl HealthCheckable for InMemoryPaymentStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("in-memory-payment-store", 0)
    }
}

#[async_trait]
impl InvoiceLedger for InMemoryPaymentStore {
    async fn find_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        self.state
            .read()
            .await
            .invoices
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Invoice", id))
    }

    async fn save_invoice(&self, invoice: &Invoice) -> Result<(), PortError> {
        self.state.write().await.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_order(&self, order: PaymentOrder) -> Result<InsertOutcome, PortError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .orders
            .values()
            .find(|o| o.invoice_id == order.invoice_id && o.status == OrderStatus::Created)
        {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        if state.orders.values().any(|o| o.gateway_order_id == order.gateway_order_id) {
            return Err(PortError::conflict(format!(
                "gateway order {} already stored",
                order.gateway_order_id
            )));
        }
        state.orders.insert(order.id, order.clone());
        Ok(InsertOutcome::Inserted(order))
    }

    async fn find_order(&self, id: PaymentOrderId) -> Result<PaymentOrder, PortError> {
        self.state
            .read()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("PaymentOrder", id))
    }

    async fn find_order_by_gateway_id(&self, gateway_order_id: &GatewayOrderId) -> Result<PaymentOrder, PortError> {
        self.state
            .read()
            .await
            .orders
            .values()
            .find(|o| &o.gateway_order_id == gateway_order_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("PaymentOrder", gateway_order_id))
    }

    async fn find_order_by_payment_id(&self, payment_id: &GatewayPaymentId) -> Result<PaymentOrder, PortError> {
        self.state
            .read()
            .await
            .orders
            .values()
            .find(|o| o.gateway_payment_id.as_ref() == Some(payment_id))
            .cloned()
            .ok_or_else(|| PortError::not_found("Payment", payment_id))
    }

    async fn find_created_order(&self, invoice_id: InvoiceId) -> Result<Option<PaymentOrder>, PortError> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .find(|o| o.invoice_id == invoice_id && o.status == OrderStatus::Created)
            .cloned())
    }

    async fn update_order(&self, order: &PaymentOrder) -> Result<PaymentOrder, PortError> {
        let mut state = self.state.write().await;
        let version = state.check_version(order)?;
        Ok(state.write_order(order, version))
    }

    async fn commit_settlement(&self, settlement: &Settlement) -> Result<PaymentOrder, PortError> {
        let mut state = self.state.write().await;
        let version = state.check_version(&settlement.order)?;

        let invoice = state
            .invoices
            .get(&settlement.invoice.id)
            .ok_or_else(|| PortError::not_found("Invoice", settlement.invoice.id))?;
        if invoice.paid_amount != settlement.receipt.previously_paid {
            return Err(PortError::conflict(format!(
                "invoice {} was credited concurrently",
                invoice.invoice_number
            )));
        }

        state.invoices.insert(settlement.invoice.id, settlement.invoice.clone());
        state.payments.push(settlement.payment.clone());
        state
            .receipts
            .insert(settlement.order.id, settlement.receipt.clone());
        Ok(state.write_order(&settlement.order, version))
    }

    async fn commit_failure(&self, order: &PaymentOrder, payment: &Payment) -> Result<PaymentOrder, PortError> {
        let mut state = self.state.write().await;
        let version = state.check_version(order)?;
        state.payments.push(payment.clone());
        Ok(state.write_order(order, version))
    }

    async fn commit_refund(&self, order: &PaymentOrder, refund: &RefundRecord) -> Result<PaymentOrder, PortError> {
        let mut state = self.state.write().await;
        let version = state.check_version(order)?;
        state.refunds.push(refund.clone());
        Ok(state.write_order(order, version))
    }

    async fn list_expired_orders(&self, now: DateTime<Utc>) -> Result<Vec<PaymentOrder>, PortError> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.is_expired_at(now))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.expires_at);
        Ok(orders)
    }

    async fn list_payments(&self, query: &PaymentQuery) -> Result<Vec<Payment>, PortError> {
        let state = self.state.read().await;
        let mut payments: Vec<_> = state
            .payments
            .iter()
            .filter(|p| query.matches(p.invoice_id, p.amount.currency(), p.created_at))
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn list_refunds(&self, query: &PaymentQuery) -> Result<Vec<RefundRecord>, PortError> {
        let state = self.state.read().await;
        let mut refunds: Vec<_> = state
            .refunds
            .iter()
            .filter(|r| query.matches(r.invoice_id, r.amount.currency(), r.created_at))
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at);
        Ok(refunds)
    }

    async fn find_receipt(&self, order_id: PaymentOrderId) -> Result<Option<Receipt>, PortError> {
        Ok(self.state.read().await.receipts.get(&order_id).cloned())
    }
}
