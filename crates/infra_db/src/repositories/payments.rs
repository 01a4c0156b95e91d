//! Payment repository implementation
//!
//! SQL for invoices, payment orders, payment records, refunds and receipts.
//! Rows are plain column mirrors; the adapter turns them into domain types.
//!
//! # Guarded writes
//!
//! - `payment_orders` rows are updated only at the version the caller read,
//!   and the version is bumped by the statement itself
//! - settlement credits the invoice only if `paid_minor` still holds the
//!   amount the caller read
//! - multi-row writes run in a single transaction; any failed guard drops
//!   the transaction and nothing is written

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgArguments, PgConnection};
use sqlx::query::QueryAs;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;

/// Repository for the payments schema
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Invoices
    // ------------------------------------------------------------------

    /// Retrieves an invoice by identifier
    ///
    /// # Returns
    ///
    /// The invoice row or a NotFound error
    pub async fn get_invoice(&self, id: Uuid) -> Result<InvoiceRow, DatabaseError> {
        sqlx::query_as::<_, InvoiceRow>("SELECT * FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Invoice", id))
    }

    /// Inserts the invoice or overwrites the stored copy
    pub async fn upsert_invoice(&self, row: &InvoiceRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, customer_name, customer_email, customer_phone,
                currency, total_minor, paid_minor, status, due_date, paid_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                invoice_number = EXCLUDED.invoice_number,
                customer_name = EXCLUDED.customer_name,
                customer_email = EXCLUDED.customer_email,
                customer_phone = EXCLUDED.customer_phone,
                currency = EXCLUDED.currency,
                total_minor = EXCLUDED.total_minor,
                paid_minor = EXCLUDED.paid_minor,
                status = EXCLUDED.status,
                due_date = EXCLUDED.due_date,
                paid_at = EXCLUDED.paid_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(row.id)
        .bind(&row.invoice_number)
        .bind(&row.customer_name)
        .bind(&row.customer_email)
        .bind(&row.customer_phone)
        .bind(&row.currency)
        .bind(row.total_minor)
        .bind(row.paid_minor)
        .bind(&row.status)
        .bind(row.due_date)
        .bind(row.paid_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Inserts a `CREATED` order
    ///
    /// # Returns
    ///
    /// The stored row, or `None` when the invoice already has a `CREATED`
    /// order and the partial unique index rejected this one
    pub async fn insert_order(&self, row: &OrderRow) -> Result<Option<OrderRow>, DatabaseError> {
        let query = sqlx::query_as::<_, OrderRow>(
            r#"
            INSERT INTO payment_orders (
                id, gateway_order_id, invoice_id, currency, amount_minor,
                amount_paid_minor, amount_refunded_minor, status, receipt,
                gateway_payment_id, signature, signature_verified, method, bank,
                wallet, vpa, fee_minor, tax_minor, gateway_status, failure_code,
                failure_reason, expires_at, paid_at, created_at, updated_at, version
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26
            )
            ON CONFLICT (invoice_id) WHERE status = 'CREATED' DO NOTHING
            RETURNING *
            "#,
        );

        let inserted = bind_order(query, row).fetch_optional(&self.pool).await?;
        if inserted.is_none() {
            debug!(invoice_id = %row.invoice_id, "Invoice already has an open order");
        }
        Ok(inserted)
    }

    pub async fn get_order(&self, id: Uuid) -> Result<OrderRow, DatabaseError> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM payment_orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("PaymentOrder", id))
    }

    pub async fn get_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<OrderRow, DatabaseError> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM payment_orders WHERE gateway_order_id = $1")
            .bind(gateway_order_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("PaymentOrder", gateway_order_id))
    }

    pub async fn get_order_by_payment_id(&self, payment_id: &str) -> Result<OrderRow, DatabaseError> {
        sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM payment_orders WHERE gateway_payment_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Payment", payment_id))
    }

    /// The invoice's open order, if any
    pub async fn find_created_order(&self, invoice_id: Uuid) -> Result<Option<OrderRow>, DatabaseError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM payment_orders WHERE invoice_id = $1 AND status = 'CREATED'",
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// All orders for an invoice, oldest first
    pub async fn list_orders_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<OrderRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM payment_orders WHERE invoice_id = $1 ORDER BY created_at",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// `CREATED` orders whose expiry is before `now`, soonest expiry first
    pub async fn list_expired_orders(&self, now: DateTime<Utc>) -> Result<Vec<OrderRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT * FROM payment_orders
            WHERE status = 'CREATED' AND expires_at < $1
            ORDER BY expires_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Version-guarded update of a single order
    pub async fn update_order(&self, row: &OrderRow) -> Result<OrderRow, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let stored = write_order(&mut tx, row).await?;
        tx.commit().await?;
        Ok(stored)
    }

    /// Writes the paid order, the payment record, the credited invoice and
    /// the receipt in one transaction
    ///
    /// # Arguments
    ///
    /// * `settlement` - rows to write; `previously_paid_minor` is the invoice
    ///   balance the caller computed the credit from
    pub async fn settle(&self, settlement: &SettlementRows) -> Result<OrderRow, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let order = write_order(&mut tx, &settlement.order).await?;

        let invoice = &settlement.invoice;
        let credited = sqlx::query(
            r#"
            UPDATE invoices
            SET paid_minor = $2, status = $3, paid_at = $4, updated_at = $5
            WHERE id = $1 AND paid_minor = $6
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.paid_minor)
        .bind(&invoice.status)
        .bind(invoice.paid_at)
        .bind(invoice.updated_at)
        .bind(settlement.previously_paid_minor)
        .execute(&mut *tx)
        .await?;

        if credited.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM invoices WHERE id = $1)")
                .bind(invoice.id)
                .fetch_one(&mut *tx)
                .await?;
            return Err(if exists {
                DatabaseError::conflict(format!("invoice {} was credited concurrently", invoice.invoice_number))
            } else {
                DatabaseError::not_found("Invoice", invoice.id)
            });
        }

        insert_payment(&mut tx, &settlement.payment).await?;
        insert_receipt(&mut tx, &settlement.receipt).await?;

        tx.commit().await?;
        debug!(order_id = %order.id, version = order.version, "Settlement committed");
        Ok(order)
    }

    /// Writes the failed order and its audit payment record
    pub async fn record_failure(&self, order: &OrderRow, payment: &PaymentRow) -> Result<OrderRow, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let stored = write_order(&mut tx, order).await?;
        insert_payment(&mut tx, payment).await?;
        tx.commit().await?;
        Ok(stored)
    }

    /// Writes the refunded order and the refund record
    pub async fn record_refund(&self, order: &OrderRow, refund: &RefundRow) -> Result<OrderRow, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let stored = write_order(&mut tx, order).await?;

        sqlx::query(
            r#"
            INSERT INTO refunds (
                id, order_id, invoice_id, gateway_refund_id, gateway_payment_id,
                currency, amount_minor, speed, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(refund.id)
        .bind(refund.order_id)
        .bind(refund.invoice_id)
        .bind(&refund.gateway_refund_id)
        .bind(&refund.gateway_payment_id)
        .bind(&refund.currency)
        .bind(refund.amount_minor)
        .bind(&refund.speed)
        .bind(&refund.status)
        .bind(refund.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    // ------------------------------------------------------------------
    // Ledger reads
    // ------------------------------------------------------------------

    /// Payment records matching the filter, oldest first
    pub async fn list_payments(&self, filter: &RecordFilter) -> Result<Vec<PaymentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT * FROM payments
            WHERE ($1::uuid IS NULL OR invoice_id = $1)
              AND ($2::text IS NULL OR currency = $2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at < $4)
            ORDER BY created_at
            "#,
        )
        .bind(filter.invoice_id)
        .bind(&filter.currency)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Refund records matching the filter, oldest first
    pub async fn list_refunds(&self, filter: &RecordFilter) -> Result<Vec<RefundRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT * FROM refunds
            WHERE ($1::uuid IS NULL OR invoice_id = $1)
              AND ($2::text IS NULL OR currency = $2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at < $4)
            ORDER BY created_at
            "#,
        )
        .bind(filter.invoice_id)
        .bind(&filter.currency)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn get_receipt(&self, order_id: Uuid) -> Result<Option<ReceiptRow>, DatabaseError> {
        let row = sqlx::query_as::<_, ReceiptRow>("SELECT * FROM receipts WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }
}

// ============================================================================
// Statement helpers
// ============================================================================

/// Binds every `payment_orders` column in table order, `$1` to `$26`
fn bind_order<'q>(
    query: QueryAs<'q, Postgres, OrderRow, PgArguments>,
    row: &OrderRow,
) -> QueryAs<'q, Postgres, OrderRow, PgArguments> {
    query
        .bind(row.id)
        .bind(row.gateway_order_id.clone())
        .bind(row.invoice_id)
        .bind(row.currency.clone())
        .bind(row.amount_minor)
        .bind(row.amount_paid_minor)
        .bind(row.amount_refunded_minor)
        .bind(row.status.clone())
        .bind(row.receipt.clone())
        .bind(row.gateway_payment_id.clone())
        .bind(row.signature.clone())
        .bind(row.signature_verified)
        .bind(row.method.clone())
        .bind(row.bank.clone())
        .bind(row.wallet.clone())
        .bind(row.vpa.clone())
        .bind(row.fee_minor)
        .bind(row.tax_minor)
        .bind(row.gateway_status.clone())
        .bind(row.failure_code.clone())
        .bind(row.failure_reason.clone())
        .bind(row.expires_at)
        .bind(row.paid_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.version)
}

/// Overwrites the order at the version it was read with and bumps the version
async fn write_order(conn: &mut PgConnection, row: &OrderRow) -> Result<OrderRow, DatabaseError> {
    let query = sqlx::query_as::<_, OrderRow>(
        r#"
        UPDATE payment_orders SET
            gateway_order_id = $2,
            invoice_id = $3,
            currency = $4,
            amount_minor = $5,
            amount_paid_minor = $6,
            amount_refunded_minor = $7,
            status = $8,
            receipt = $9,
            gateway_payment_id = $10,
            signature = $11,
            signature_verified = $12,
            method = $13,
            bank = $14,
            wallet = $15,
            vpa = $16,
            fee_minor = $17,
            tax_minor = $18,
            gateway_status = $19,
            failure_code = $20,
            failure_reason = $21,
            expires_at = $22,
            paid_at = $23,
            created_at = $24,
            updated_at = $25,
            version = version + 1
        WHERE id = $1 AND version = $26
        RETURNING *
        "#,
    );

    if let Some(stored) = bind_order(query, row).fetch_optional(&mut *conn).await? {
        return Ok(stored);
    }

    let current: Option<i64> = sqlx::query_scalar("SELECT version FROM payment_orders WHERE id = $1")
        .bind(row.id)
        .fetch_optional(&mut *conn)
        .await?;

    match current {
        Some(version) => Err(DatabaseError::conflict(format!(
            "order {} is at version {}, write was based on {}",
            row.gateway_order_id, version, row.version
        ))),
        None => Err(DatabaseError::not_found("PaymentOrder", row.id)),
    }
}

async fn insert_payment(conn: &mut PgConnection, row: &PaymentRow) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, invoice_id, order_id, currency, amount_minor, method, status,
            transaction_id, failure_reason, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(row.id)
    .bind(row.invoice_id)
    .bind(row.order_id)
    .bind(&row.currency)
    .bind(row.amount_minor)
    .bind(&row.method)
    .bind(&row.status)
    .bind(&row.transaction_id)
    .bind(&row.failure_reason)
    .bind(row.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_receipt(conn: &mut PgConnection, row: &ReceiptRow) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO receipts (id, order_id, receipt_number, invoice_id, body, issued_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(row.id)
    .bind(row.order_id)
    .bind(&row.receipt_number)
    .bind(row.invoice_id)
    .bind(&row.body)
    .bind(row.issued_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// ============================================================================
// Row types
// ============================================================================

/// Database row for an invoice
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub invoice_number: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub currency: String,
    pub total_minor: i64,
    pub paid_minor: i64,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row for a payment order
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub gateway_order_id: String,
    pub invoice_id: Uuid,
    pub currency: String,
    pub amount_minor: i64,
    pub amount_paid_minor: i64,
    pub amount_refunded_minor: i64,
    pub status: String,
    pub receipt: String,
    pub gateway_payment_id: Option<String>,
    pub signature: Option<String>,
    pub signature_verified: bool,
    pub method: Option<String>,
    pub bank: Option<String>,
    pub wallet: Option<String>,
    pub vpa: Option<String>,
    pub fee_minor: Option<i64>,
    pub tax_minor: Option<i64>,
    pub gateway_status: Option<String>,
    pub failure_code: Option<String>,
    pub failure_reason: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// Database row for a payment ledger record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub order_id: Uuid,
    pub currency: String,
    pub amount_minor: i64,
    pub method: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Database row for a refund
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefundRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub invoice_id: Uuid,
    pub gateway_refund_id: String,
    pub gateway_payment_id: String,
    pub currency: String,
    pub amount_minor: i64,
    pub speed: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Database row for an issued receipt; the full receipt is kept as JSONB
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReceiptRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub receipt_number: String,
    pub invoice_id: Uuid,
    pub body: Json<serde_json::Value>,
    pub issued_at: DateTime<Utc>,
}

/// Everything `settle` writes
#[derive(Debug, Clone)]
pub struct SettlementRows {
    pub order: OrderRow,
    pub payment: PaymentRow,
    pub invoice: InvoiceRow,
    pub previously_paid_minor: i64,
    pub receipt: ReceiptRow,
}

/// Optional filters for payment and refund listings
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub invoice_id: Option<Uuid>,
    pub currency: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
