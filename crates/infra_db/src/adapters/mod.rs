//! Domain Adapters
//!
//! Adapter implementations for the payment domain ports, connecting them to
//! the PostgreSQL repository layer.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresPaymentAdapter;
//! use std::sync::Arc;
//!
//! let adapter = Arc::new(PostgresPaymentAdapter::new(pool));
//! let ports = PaymentPorts { ledger: adapter.clone(), store: adapter, /* .. */ };
//! ```

pub mod payments;

pub use payments::PostgresPaymentAdapter;
