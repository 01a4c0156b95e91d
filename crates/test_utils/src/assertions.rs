//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for payment types that give
//! more meaningful failure messages than bare `assert_eq!`.

use core_kernel::Money;
use domain_payments::{Invoice, InvoiceStatus, OrderStatus, PaymentOrder, Receipt};

/// Asserts two amounts are equal, printing both with their currency
pub fn assert_money_eq(actual: &Money, expected: &Money) {
    assert_eq!(
        actual, expected,
        "Money mismatch: actual={}, expected={}",
        actual, expected
    );
}

/// Asserts an invoice's paid amount, remaining balance and status
pub fn assert_invoice_balance(invoice: &Invoice, paid_minor: i64, status: InvoiceStatus) {
    assert_eq!(
        invoice.paid_amount.minor_units(),
        paid_minor,
        "Invoice {} paid amount: actual={}, expected {} minor units",
        invoice.invoice_number,
        invoice.paid_amount,
        paid_minor
    );
    assert_eq!(
        invoice.status, status,
        "Invoice {} status: actual={}, expected={}",
        invoice.invoice_number, invoice.status, status
    );
    let remaining = invoice.remaining_amount().expect("paid amount never exceeds total");
    assert_eq!(
        remaining.minor_units(),
        invoice.total_amount.minor_units() - paid_minor,
        "Invoice {} remaining balance is inconsistent",
        invoice.invoice_number
    );
}

/// Asserts an order's status
pub fn assert_order_status(order: &PaymentOrder, expected: OrderStatus) {
    assert_eq!(
        order.status, expected,
        "Order {} status: actual={}, expected={}",
        order.gateway_order_id, order.status, expected
    );
}

/// Asserts the figures printed on a receipt
pub fn assert_receipt(receipt: &Receipt, paid_minor: i64, remaining_minor: i64, fully_paid: bool) {
    assert_eq!(receipt.amount_paid.minor_units(), paid_minor, "Receipt {} amount", receipt.receipt_number);
    assert_eq!(
        receipt.remaining_balance.minor_units(),
        remaining_minor,
        "Receipt {} remaining balance",
        receipt.receipt_number
    );
    assert_eq!(receipt.is_fully_paid, fully_paid, "Receipt {} fully-paid flag", receipt.receipt_number);
    assert!(
        receipt.receipt_number.starts_with("RCP-"),
        "Receipt number {} has no RCP- prefix",
        receipt.receipt_number
    );
}
