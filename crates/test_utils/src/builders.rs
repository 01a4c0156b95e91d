//! Test Data Builders
//!
//! Provides builder patterns for constructing invoices and payment orders
//! with sensible defaults. Tests set only the fields they care about.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use core_kernel::{GatewayOrderId, InvoiceId, Money};
use domain_payments::{Invoice, InvoiceStatus, PaymentOrder};

use crate::fixtures::{IdFixtures, MoneyFixtures, StringFixtures, TemporalFixtures};

/// Builder for invoices
pub struct InvoiceBuilder {
    id: InvoiceId,
    invoice_number: String,
    total: Money,
    paid: Option<Money>,
    status: Option<InvoiceStatus>,
    customer_email: Option<String>,
    due_date: Option<NaiveDate>,
}

impl Default for InvoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceBuilder {
    /// Pending ₹5000.00 invoice with nothing paid
    pub fn new() -> Self {
        Self {
            id: InvoiceId::new(),
            invoice_number: StringFixtures::invoice_number().to_string(),
            total: MoneyFixtures::invoice_total(),
            paid: None,
            status: None,
            customer_email: Some(StringFixtures::customer_email().to_string()),
            due_date: Some(TemporalFixtures::due_date()),
        }
    }

    pub fn with_id(mut self, id: InvoiceId) -> Self {
        self.id = id;
        self
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.invoice_number = number.into();
        self
    }

    pub fn with_total(mut self, total: Money) -> Self {
        self.total = total;
        self
    }

    /// Sets the amount already paid; status becomes `PARTIALLY_PAID` or `PAID` unless overridden
    pub fn with_paid(mut self, paid: Money) -> Self {
        self.paid = Some(paid);
        self
    }

    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn without_email(mut self) -> Self {
        self.customer_email = None;
        self
    }

    pub fn build(self) -> Invoice {
        let mut invoice = Invoice::new(self.invoice_number, self.total);
        invoice.id = self.id;
        invoice.customer_name = Some("Northwind Fleet Services".to_string());
        invoice.customer_email = self.customer_email;
        invoice.due_date = self.due_date;

        if let Some(paid) = self.paid {
            invoice.paid_amount = paid;
            invoice.status = if invoice.is_fully_paid() {
                InvoiceStatus::Paid
            } else if paid.is_zero() {
                InvoiceStatus::Pending
            } else {
                InvoiceStatus::PartiallyPaid
            };
        }
        if let Some(status) = self.status {
            invoice.status = status;
        }
        invoice
    }
}

/// Builder for payment orders in `CREATED`
pub struct PaymentOrderBuilder {
    invoice_id: InvoiceId,
    gateway_order_id: GatewayOrderId,
    amount: Money,
    expires_at: DateTime<Utc>,
}

impl Default for PaymentOrderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentOrderBuilder {
    pub fn new() -> Self {
        Self {
            invoice_id: IdFixtures::invoice_id(),
            gateway_order_id: IdFixtures::gateway_order_id(),
            amount: MoneyFixtures::invoice_total(),
            expires_at: Utc::now() + Duration::minutes(30),
        }
    }

    pub fn for_invoice(mut self, invoice_id: InvoiceId) -> Self {
        self.invoice_id = invoice_id;
        self
    }

    pub fn with_gateway_id(mut self, id: impl Into<String>) -> Self {
        self.gateway_order_id = GatewayOrderId::new(id.into());
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = at;
        self
    }

    /// Order whose expiry has already passed
    pub fn expired(self) -> Self {
        self.expiring_at(Utc::now() - Duration::minutes(5))
    }

    pub fn build(self) -> PaymentOrder {
        PaymentOrder::new(
            self.invoice_id,
            self.gateway_order_id,
            self.amount,
            "rcpt_test",
            self.expires_at,
        )
    }
}
