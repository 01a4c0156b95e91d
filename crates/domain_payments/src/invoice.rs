//! Invoice view and the ledger port
//!
//! Invoices are owned by the billing system. This core reads them to guard
//! payment attempts and writes `paid_amount`/`status` only through the
//! reconciler.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{Currency, DomainPort, InvoiceId, Money, MoneyError, PortError};

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Invoice is being drafted and cannot be paid yet
    Draft,
    /// Issued and awaiting payment
    Pending,
    /// Some payment received
    PartiallyPaid,
    /// Fully paid
    Paid,
    /// Past due date, still payable
    Overdue,
    /// Cancelled/voided
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::PartiallyPaid => "PARTIALLY_PAID",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(InvoiceStatus::Draft),
            "PENDING" => Ok(InvoiceStatus::Pending),
            "PARTIALLY_PAID" => Ok(InvoiceStatus::PartiallyPaid),
            "PAID" => Ok(InvoiceStatus::Paid),
            "OVERDUE" => Ok(InvoiceStatus::Overdue),
            "CANCELLED" => Ok(InvoiceStatus::Cancelled),
            other => Err(format!("unknown invoice status: {}", other)),
        }
    }
}

/// An invoice as seen by the payment core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier
    pub id: InvoiceId,
    /// Invoice number (human-readable)
    pub invoice_number: String,
    /// Billed customer's display name
    pub customer_name: Option<String>,
    /// Billed customer's email, used for receipts
    pub customer_email: Option<String>,
    /// Billed customer's phone
    pub customer_phone: Option<String>,
    /// Total amount
    pub total_amount: Money,
    /// Amount paid so far; never exceeds `total_amount`
    pub paid_amount: Money,
    /// Status
    pub status: InvoiceStatus,
    /// Due date
    pub due_date: Option<NaiveDate>,
    /// Set when the invoice becomes fully paid
    pub paid_at: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates a pending invoice with nothing paid
    pub fn new(invoice_number: impl Into<String>, total_amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: InvoiceId::new(),
            invoice_number: invoice_number.into(),
            customer_name: None,
            customer_email: None,
            customer_phone: None,
            total_amount,
            paid_amount: Money::zero(total_amount.currency()),
            status: InvoiceStatus::Pending,
            due_date: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn currency(&self) -> Currency {
        self.total_amount.currency()
    }

    /// Outstanding balance, derived from total and paid
    pub fn remaining_amount(&self) -> Result<Money, MoneyError> {
        self.total_amount.checked_sub(&self.paid_amount)
    }

    pub fn is_fully_paid(&self) -> bool {
        self.paid_amount.minor_units() >= self.total_amount.minor_units()
    }
}

/// Port to the invoice ledger owned by the billing system
#[async_trait]
pub trait InvoiceLedger: DomainPort {
    /// Loads an invoice, `PortError::NotFound` if it does not exist
    async fn find_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError>;

    /// Persists an updated invoice
    async fn save_invoice(&self, invoice: &Invoice) -> Result<(), PortError>;
}
