//! PostgreSQL Payment Adapter
//!
//! Implements the `InvoiceLedger` and `PaymentStore` ports on top of the
//! `PaymentRepository`.
//!
//! # Overview
//!
//! The `PostgresPaymentAdapter` serves as the bridge between the domain
//! layer's port interfaces and the database layer. It:
//!
//! - Translates domain requests into repository operations
//! - Converts database row types back to domain models
//! - Translates `DatabaseError` into `PortError`
//!
//! Amounts are stored as minor units beside a currency code; a stored value
//! that no longer decodes (unknown currency, unknown status) surfaces as an
//! internal error rather than being skipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::str::FromStr;
use tracing::{debug, instrument, warn};

use core_kernel::{
    Currency, DomainPort, GatewayOrderId, GatewayPaymentId, GatewayRefundId,
    HealthCheckResult, HealthCheckable, InvoiceId, Money, PaymentId, PaymentOrderId, PortError,
    RefundRecordId,
};
use domain_payments::store::{InsertOutcome, Settlement};
use domain_payments::{
    Invoice, InvoiceLedger, InvoiceStatus, OrderStatus, Payment, PaymentMethod,
    PaymentMethodDetails, PaymentOrder, PaymentQuery, PaymentStatus, PaymentStore, Receipt,
    RefundRecord, RefundSpeed,
};

use crate::error::DatabaseError;
use crate::repositories::payments::{
    InvoiceRow, OrderRow, PaymentRepository, PaymentRow, ReceiptRow, RecordFilter, RefundRow,
    SettlementRows,
};

const ADAPTER_ID: &str = "postgres-payment-adapter";

/// PostgreSQL-backed implementation of the payment ports
///
/// # Health Checking
///
/// Health checks run `SELECT 1` against the pool and report the latency.
#[derive(Debug, Clone)]
pub struct PostgresPaymentAdapter {
    repository: PaymentRepository,
    pool: PgPool,
}

impl PostgresPaymentAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: PaymentRepository::new(pool.clone()),
            pool,
        }
    }

    /// Returns a reference to the underlying repository
    pub fn repository(&self) -> &PaymentRepository {
        &self.repository
    }

    /// All orders for an invoice, oldest first
    pub async fn orders_for_invoice(&self, invoice_id: InvoiceId) -> Result<Vec<PaymentOrder>, PortError> {
        let rows = self
            .repository
            .list_orders_for_invoice(*invoice_id.as_uuid())
            .await?;
        rows.into_iter().map(row_to_order).collect()
    }
}

impl DomainPort for PostgresPaymentAdapter {}

#[async_trait]
impl HealthCheckable for PostgresPaymentAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult::healthy(ADAPTER_ID, latency_ms),
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                HealthCheckResult::unhealthy(ADAPTER_ID, latency_ms, format!("Database error: {}", e))
            }
        }
    }
}

#[async_trait]
impl InvoiceLedger for PostgresPaymentAdapter {
    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn find_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        debug!("Fetching invoice");
        let row = self.repository.get_invoice(*id.as_uuid()).await?;
        row_to_invoice(row)
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id))]
    async fn save_invoice(&self, invoice: &Invoice) -> Result<(), PortError> {
        self.repository.upsert_invoice(&invoice_to_row(invoice)).await?;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentAdapter {
    #[instrument(skip(self, order), fields(gateway_order_id = %order.gateway_order_id))]
    async fn insert_order(&self, order: PaymentOrder) -> Result<InsertOutcome, PortError> {
        if let Some(row) = self.repository.insert_order(&order_to_row(&order)).await? {
            return Ok(InsertOutcome::Inserted(row_to_order(row)?));
        }

        match self.repository.find_created_order(*order.invoice_id.as_uuid()).await? {
            Some(existing) => Ok(InsertOutcome::Existing(row_to_order(existing)?)),
            // The open order closed between the insert and the read
            None => Err(PortError::conflict(format!(
                "open order for invoice {} changed during insert",
                order.invoice_id
            ))),
        }
    }

    async fn find_order(&self, id: PaymentOrderId) -> Result<PaymentOrder, PortError> {
        let row = self.repository.get_order(*id.as_uuid()).await?;
        row_to_order(row)
    }

    async fn find_order_by_gateway_id(&self, gateway_order_id: &GatewayOrderId) -> Result<PaymentOrder, PortError> {
        let row = self
            .repository
            .get_order_by_gateway_id(gateway_order_id.as_str())
            .await?;
        row_to_order(row)
    }

    async fn find_order_by_payment_id(&self, payment_id: &GatewayPaymentId) -> Result<PaymentOrder, PortError> {
        let row = self
            .repository
            .get_order_by_payment_id(payment_id.as_str())
            .await?;
        row_to_order(row)
    }

    async fn find_created_order(&self, invoice_id: InvoiceId) -> Result<Option<PaymentOrder>, PortError> {
        self.repository
            .find_created_order(*invoice_id.as_uuid())
            .await?
            .map(row_to_order)
            .transpose()
    }

    #[instrument(skip(self, order), fields(gateway_order_id = %order.gateway_order_id, version = order.version))]
    async fn update_order(&self, order: &PaymentOrder) -> Result<PaymentOrder, PortError> {
        let row = self.repository.update_order(&order_to_row(order)).await?;
        row_to_order(row)
    }

    #[instrument(skip(self, settlement), fields(gateway_order_id = %settlement.order.gateway_order_id))]
    async fn commit_settlement(&self, settlement: &Settlement) -> Result<PaymentOrder, PortError> {
        let rows = SettlementRows {
            order: order_to_row(&settlement.order),
            payment: payment_to_row(&settlement.payment),
            invoice: invoice_to_row(&settlement.invoice),
            previously_paid_minor: settlement.receipt.previously_paid.minor_units(),
            receipt: receipt_to_row(&settlement.receipt)?,
        };
        let row = self.repository.settle(&rows).await?;
        row_to_order(row)
    }

    async fn commit_failure(&self, order: &PaymentOrder, payment: &Payment) -> Result<PaymentOrder, PortError> {
        let row = self
            .repository
            .record_failure(&order_to_row(order), &payment_to_row(payment))
            .await?;
        row_to_order(row)
    }

    async fn commit_refund(&self, order: &PaymentOrder, refund: &RefundRecord) -> Result<PaymentOrder, PortError> {
        let row = self
            .repository
            .record_refund(&order_to_row(order), &refund_to_row(refund))
            .await?;
        row_to_order(row)
    }

    async fn list_expired_orders(&self, now: DateTime<Utc>) -> Result<Vec<PaymentOrder>, PortError> {
        let rows = self.repository.list_expired_orders(now).await?;
        rows.into_iter().map(row_to_order).collect()
    }

    async fn list_payments(&self, query: &PaymentQuery) -> Result<Vec<Payment>, PortError> {
        let rows = self.repository.list_payments(&query_to_filter(query)).await?;
        rows.into_iter().map(row_to_payment).collect()
    }

    async fn list_refunds(&self, query: &PaymentQuery) -> Result<Vec<RefundRecord>, PortError> {
        let rows = self.repository.list_refunds(&query_to_filter(query)).await?;
        rows.into_iter().map(row_to_refund).collect()
    }

    async fn find_receipt(&self, order_id: PaymentOrderId) -> Result<Option<Receipt>, PortError> {
        self.repository
            .get_receipt(*order_id.as_uuid())
            .await?
            .map(row_to_receipt)
            .transpose()
    }
}

// ============================================================================
// Conversion helpers
// ============================================================================

fn decode_currency(code: &str) -> Result<Currency, PortError> {
    Currency::from_str(code).map_err(|e| PortError::from(DatabaseError::serialization(e)))
}

fn decode_money(minor: i64, currency: Currency) -> Result<Money, PortError> {
    Money::from_minor(minor, currency).map_err(|e| PortError::from(DatabaseError::serialization(e)))
}

fn decode_enum<T: FromStr>(value: &str, what: &str) -> Result<T, PortError> {
    T::from_str(value)
        .map_err(|_| PortError::from(DatabaseError::serialization(format!("unknown {} '{}'", what, value))))
}

fn query_to_filter(query: &PaymentQuery) -> RecordFilter {
    RecordFilter {
        invoice_id: query.invoice_id.map(|id| *id.as_uuid()),
        currency: query.currency.map(|c| c.code().to_string()),
        from: query.from,
        to: query.to,
    }
}

fn invoice_to_row(invoice: &Invoice) -> InvoiceRow {
    InvoiceRow {
        id: *invoice.id.as_uuid(),
        invoice_number: invoice.invoice_number.clone(),
        customer_name: invoice.customer_name.clone(),
        customer_email: invoice.customer_email.clone(),
        customer_phone: invoice.customer_phone.clone(),
        currency: invoice.currency().code().to_string(),
        total_minor: invoice.total_amount.minor_units(),
        paid_minor: invoice.paid_amount.minor_units(),
        status: invoice.status.as_str().to_string(),
        due_date: invoice.due_date,
        paid_at: invoice.paid_at,
        created_at: invoice.created_at,
        updated_at: invoice.updated_at,
    }
}

fn row_to_invoice(row: InvoiceRow) -> Result<Invoice, PortError> {
    let currency = decode_currency(&row.currency)?;
    Ok(Invoice {
        id: InvoiceId::from(row.id),
        invoice_number: row.invoice_number,
        customer_name: row.customer_name,
        customer_email: row.customer_email,
        customer_phone: row.customer_phone,
        total_amount: decode_money(row.total_minor, currency)?,
        paid_amount: decode_money(row.paid_minor, currency)?,
        status: decode_enum::<InvoiceStatus>(&row.status, "invoice status")?,
        due_date: row.due_date,
        paid_at: row.paid_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn order_to_row(order: &PaymentOrder) -> OrderRow {
    let details = order.method_details.as_ref();
    OrderRow {
        id: *order.id.as_uuid(),
        gateway_order_id: order.gateway_order_id.as_str().to_string(),
        invoice_id: *order.invoice_id.as_uuid(),
        currency: order.currency().code().to_string(),
        amount_minor: order.amount.minor_units(),
        amount_paid_minor: order.amount_paid.minor_units(),
        amount_refunded_minor: order.amount_refunded.minor_units(),
        status: order.status.as_str().to_string(),
        receipt: order.receipt.clone(),
        gateway_payment_id: order.gateway_payment_id.as_ref().map(|id| id.as_str().to_string()),
        signature: order.signature.clone(),
        signature_verified: order.signature_verified,
        method: details.map(|d| d.method.as_str().to_string()),
        bank: details.and_then(|d| d.bank.clone()),
        wallet: details.and_then(|d| d.wallet.clone()),
        vpa: details.and_then(|d| d.vpa.clone()),
        fee_minor: details.and_then(|d| d.fee).map(|m| m.minor_units()),
        tax_minor: details.and_then(|d| d.tax).map(|m| m.minor_units()),
        gateway_status: order.gateway_status.clone(),
        failure_code: order.failure_code.clone(),
        failure_reason: order.failure_reason.clone(),
        expires_at: order.expires_at,
        paid_at: order.paid_at,
        created_at: order.created_at,
        updated_at: order.updated_at,
        version: order.version,
    }
}

fn row_to_order(row: OrderRow) -> Result<PaymentOrder, PortError> {
    let currency = decode_currency(&row.currency)?;

    let method_details = match row.method {
        Some(method) => Some(PaymentMethodDetails {
            method: PaymentMethod::from_gateway(&method),
            bank: row.bank,
            wallet: row.wallet,
            vpa: row.vpa,
            fee: row.fee_minor.map(|m| decode_money(m, currency)).transpose()?,
            tax: row.tax_minor.map(|m| decode_money(m, currency)).transpose()?,
        }),
        None => None,
    };

    Ok(PaymentOrder {
        id: PaymentOrderId::from(row.id),
        gateway_order_id: GatewayOrderId::new(row.gateway_order_id),
        invoice_id: InvoiceId::from(row.invoice_id),
        amount: decode_money(row.amount_minor, currency)?,
        amount_paid: decode_money(row.amount_paid_minor, currency)?,
        amount_refunded: decode_money(row.amount_refunded_minor, currency)?,
        status: decode_enum::<OrderStatus>(&row.status, "order status")?,
        receipt: row.receipt,
        gateway_payment_id: row.gateway_payment_id.map(GatewayPaymentId::new),
        signature: row.signature,
        signature_verified: row.signature_verified,
        method_details,
        gateway_status: row.gateway_status,
        failure_code: row.failure_code,
        failure_reason: row.failure_reason,
        expires_at: row.expires_at,
        paid_at: row.paid_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
        version: row.version,
    })
}

fn payment_to_row(payment: &Payment) -> PaymentRow {
    PaymentRow {
        id: *payment.id.as_uuid(),
        invoice_id: *payment.invoice_id.as_uuid(),
        order_id: *payment.order_id.as_uuid(),
        currency: payment.amount.currency().code().to_string(),
        amount_minor: payment.amount.minor_units(),
        method: payment.method.as_str().to_string(),
        status: payment.status.as_str().to_string(),
        transaction_id: payment.transaction_id.as_ref().map(|id| id.as_str().to_string()),
        failure_reason: payment.failure_reason.clone(),
        created_at: payment.created_at,
    }
}

fn row_to_payment(row: PaymentRow) -> Result<Payment, PortError> {
    let currency = decode_currency(&row.currency)?;
    Ok(Payment {
        id: PaymentId::from(row.id),
        invoice_id: InvoiceId::from(row.invoice_id),
        order_id: PaymentOrderId::from(row.order_id),
        amount: decode_money(row.amount_minor, currency)?,
        method: PaymentMethod::from_gateway(&row.method),
        status: decode_enum::<PaymentStatus>(&row.status, "payment status")?,
        transaction_id: row.transaction_id.map(GatewayPaymentId::new),
        failure_reason: row.failure_reason,
        created_at: row.created_at,
    })
}

fn refund_to_row(refund: &RefundRecord) -> RefundRow {
    RefundRow {
        id: *refund.id.as_uuid(),
        order_id: *refund.order_id.as_uuid(),
        invoice_id: *refund.invoice_id.as_uuid(),
        gateway_refund_id: refund.gateway_refund_id.as_str().to_string(),
        gateway_payment_id: refund.gateway_payment_id.as_str().to_string(),
        currency: refund.amount.currency().code().to_string(),
        amount_minor: refund.amount.minor_units(),
        speed: refund.speed.as_str().to_string(),
        status: refund.status.clone(),
        created_at: refund.created_at,
    }
}

fn row_to_refund(row: RefundRow) -> Result<RefundRecord, PortError> {
    let currency = decode_currency(&row.currency)?;
    Ok(RefundRecord {
        id: RefundRecordId::from(row.id),
        order_id: PaymentOrderId::from(row.order_id),
        invoice_id: InvoiceId::from(row.invoice_id),
        gateway_refund_id: GatewayRefundId::new(row.gateway_refund_id),
        gateway_payment_id: GatewayPaymentId::new(row.gateway_payment_id),
        amount: decode_money(row.amount_minor, currency)?,
        speed: decode_enum::<RefundSpeed>(&row.speed, "refund speed")?,
        status: row.status,
        created_at: row.created_at,
    })
}

fn receipt_to_row(receipt: &Receipt) -> Result<ReceiptRow, PortError> {
    let body = serde_json::to_value(receipt).map_err(|e| PortError::from(DatabaseError::serialization(e)))?;
    Ok(ReceiptRow {
        id: *receipt.id.as_uuid(),
        order_id: *receipt.order_id.as_uuid(),
        receipt_number: receipt.receipt_number.clone(),
        invoice_id: *receipt.invoice_id.as_uuid(),
        body: Json(body),
        issued_at: receipt.issued_at,
    })
}

fn row_to_receipt(row: ReceiptRow) -> Result<Receipt, PortError> {
    serde_json::from_value(row.body.0).map_err(|e| PortError::from(DatabaseError::serialization(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn inr(minor: i64) -> Money {
        Money::from_minor(minor, Currency::INR).unwrap()
    }

    fn paid_order() -> PaymentOrder {
        let mut order = PaymentOrder::new(
            InvoiceId::new(),
            GatewayOrderId::new("order_IluGWxBm9U8zJ8"),
            inr(500_000),
            "inv_INV-2024-000123",
            Utc::now() + Duration::minutes(30),
        );
        order
            .mark_paid(
                GatewayPaymentId::new("pay_IH4NVgf4Dreq1l"),
                inr(500_000),
                PaymentMethodDetails {
                    method: PaymentMethod::Upi,
                    bank: None,
                    wallet: None,
                    vpa: Some("fleet@okaxis".to_string()),
                    fee: Some(inr(10_000)),
                    tax: Some(inr(1_800)),
                },
            )
            .unwrap();
        order.version = 3;
        order
    }

    #[test]
    fn test_order_row_keeps_method_details_and_version() {
        let order = paid_order();
        let row = order_to_row(&order);

        assert_eq!(row.currency, "INR");
        assert_eq!(row.status, "PAID");
        assert_eq!(row.method.as_deref(), Some("upi"));
        assert_eq!(row.fee_minor, Some(10_000));
        assert_eq!(row.version, 3);

        let restored = row_to_order(row).unwrap();
        assert_eq!(restored, order);
    }

    #[test]
    fn test_created_order_has_no_method_columns() {
        let order = PaymentOrder::new(
            InvoiceId::new(),
            GatewayOrderId::new("order_NEW"),
            inr(100),
            "inv_X",
            Utc::now(),
        );
        let row = order_to_row(&order);
        assert!(row.method.is_none());
        assert!(row.fee_minor.is_none());
        assert!(row_to_order(row).unwrap().method_details.is_none());
    }

    #[test]
    fn test_unknown_stored_status_is_internal_error() {
        let mut row = order_to_row(&paid_order());
        row.status = "SETTLED".to_string();

        let err = row_to_order(row).unwrap_err();
        assert!(matches!(err, PortError::Internal { .. }));
        assert!(err.to_string().contains("SETTLED"));
    }

    #[test]
    fn test_unknown_stored_currency_is_internal_error() {
        let mut row = invoice_to_row(&Invoice::new("INV-1", inr(1_000)));
        row.currency = "XXX".to_string();
        assert!(matches!(row_to_invoice(row), Err(PortError::Internal { .. })));
    }

    #[test]
    fn test_query_filter_uses_currency_code() {
        let invoice_id = InvoiceId::new();
        let filter = query_to_filter(&PaymentQuery {
            invoice_id: Some(invoice_id),
            currency: Some(Currency::INR),
            from: None,
            to: None,
        });
        assert_eq!(filter.invoice_id, Some(*invoice_id.as_uuid()));
        assert_eq!(filter.currency.as_deref(), Some("INR"));
    }
}
