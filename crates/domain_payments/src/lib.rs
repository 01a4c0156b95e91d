//! Payments Domain - Gateway Orders and Invoice Reconciliation
//!
//! This crate collects invoice payments through an external payment gateway
//! and reconciles confirmed payments against the invoices they pay for.
//!
//! # Order Lifecycle
//!
//! ```text
//! CREATED ──► PAID ──► PARTIALLY_REFUNDED ──► REFUNDED
//!    │          └────────────────────────────────▲
//!    ├──► FAILED
//!    └──► EXPIRED
//! ```
//!
//! An invoice has at most one `CREATED` order at a time. Checkout callbacks
//! and webhooks are authenticated with HMAC-SHA256 before any state changes,
//! and an order settles at most once no matter how often the gateway
//! redelivers its success notification.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_payments::{PaymentService, PaymentPorts};
//!
//! let service = PaymentService::new(ports);
//!
//! let initiation = service.initiate_payment(invoice_id, None, None).await?;
//! // ... customer completes checkout ...
//! let receipt = service
//!     .handle_payment_success(&order_id, &payment_id, &signature)
//!     .await?;
//! ```

pub mod error;
pub mod gateway;
pub mod history;
pub mod invoice;
pub mod memory;
pub mod notification;
pub mod order;
pub mod orders;
pub mod payment;
pub mod reconciler;
pub mod service;
pub mod signature;
pub mod store;
pub mod sweeper;
pub mod webhook;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{PaymentError, PaymentResult};
pub use gateway::{CustomerContact, GatewayAdapter, GatewayConfig, PaymentGateway, RetryPolicy};
pub use history::{PaymentStats, PaymentStatusView};
pub use invoice::{Invoice, InvoiceLedger, InvoiceStatus};
pub use memory::InMemoryPaymentStore;
pub use notification::{LogNotifier, Notifier, PaymentEvent};
pub use order::{OrderStatus, PaymentMethodDetails, PaymentOrder};
pub use orders::{FailureOutcome, FailureReport, Initiation, OrderStateMachine, RefundOutcome, SettleOutcome};
pub use payment::{Payment, PaymentMethod, PaymentStatus, RefundRecord, RefundSpeed};
pub use reconciler::{InvoiceReconciler, Receipt};
pub use service::{CheckoutSession, PaymentPorts, PaymentService};
pub use signature::SignatureVerifier;
pub use store::{PaymentQuery, PaymentStore};
pub use sweeper::{ExpirySweeper, SweeperConfig};
pub use webhook::{WebhookEvent, WebhookOutcome};
