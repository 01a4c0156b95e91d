//! Core Kernel - Foundational types shared by the payment reconciliation core
//!
//! This crate provides the building blocks used by the domain, persistence
//! and API crates:
//! - Money held as integer minor units with checked arithmetic
//! - Typed identifiers for internal records and gateway references
//! - Port infrastructure (errors, health checks) for hexagonal adapters
//! - A counter sink for payment outcome metrics

pub mod money;
pub mod identifiers;
pub mod ports;
pub mod metrics;

pub use money::{Money, Currency, MoneyError};
pub use identifiers::{
    InvoiceId, PaymentOrderId, PaymentId, RefundRecordId, ReceiptId,
    GatewayOrderId, GatewayPaymentId, GatewayRefundId,
};
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
pub use metrics::{MetricsSink, InMemoryMetrics, TracingMetrics};
