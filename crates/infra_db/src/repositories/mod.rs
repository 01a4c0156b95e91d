//! Repository implementations
//!
//! Repositories own the SQL and the transactions. They work in plain row
//! types keyed by UUIDs; mapping to domain types happens in `adapters`.

pub mod payments;

pub use payments::{
    InvoiceRow, OrderRow, PaymentRepository, PaymentRow, ReceiptRow, RecordFilter, RefundRow,
    SettlementRows,
};
