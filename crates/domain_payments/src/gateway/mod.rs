//! Payment gateway port and adapters
//!
//! [`PaymentGateway`] is the network boundary to the external card/UPI/wallet
//! gateway. Domain code never calls it directly: every call goes through
//! [`GatewayAdapter`], which validates configuration, retries transient
//! failures and bumps the outcome counters.
//!
//! - [`http::HttpGateway`] talks to the gateway's REST API with `reqwest`
//! - `mock::MockGateway` (feature `mock`) is a scriptable in-process gateway

pub mod adapter;
pub mod config;
pub mod http;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{
    Currency, DomainPort, GatewayOrderId, GatewayPaymentId, GatewayRefundId, Money, PortError,
};

use crate::payment::RefundSpeed;

pub use adapter::GatewayAdapter;
pub use config::GatewayConfig;
pub use retry::RetryPolicy;

/// Customer contact forwarded to the gateway checkout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Order creation request
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOrderRequest {
    pub amount: Money,
    /// Merchant receipt reference, unique per order
    pub receipt: String,
    /// Free-form key/value notes echoed back by the gateway
    pub notes: BTreeMap<String, String>,
}

/// Order as created by the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOrder {
    pub id: GatewayOrderId,
    pub status: String,
    pub amount_minor: i64,
    pub currency: Currency,
}

/// Payment status values reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPaymentStatus {
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl GatewayPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayPaymentStatus::Created => "created",
            GatewayPaymentStatus::Authorized => "authorized",
            GatewayPaymentStatus::Captured => "captured",
            GatewayPaymentStatus::Refunded => "refunded",
            GatewayPaymentStatus::Failed => "failed",
            GatewayPaymentStatus::Unknown => "unknown",
        }
    }
}

/// Authoritative payment details fetched from the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayPaymentDetails {
    pub id: GatewayPaymentId,
    pub order_id: Option<GatewayOrderId>,
    pub status: GatewayPaymentStatus,
    pub method: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub fee_minor: Option<i64>,
    pub tax_minor: Option<i64>,
    pub bank: Option<String>,
    pub wallet: Option<String>,
    pub vpa: Option<String>,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
}

/// Refund request
#[derive(Debug, Clone, PartialEq)]
pub struct RefundRequest {
    pub payment_id: GatewayPaymentId,
    pub amount: Money,
    pub speed: RefundSpeed,
}

/// Refund as accepted by the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRefund {
    pub id: GatewayRefundId,
    pub status: String,
    pub amount_minor: i64,
}

/// Port to the external payment gateway
///
/// Implementations report failures as `PortError`; transient variants
/// (connection, timeout, rate limit, unavailable) are retried by the adapter.
#[async_trait]
pub trait PaymentGateway: DomainPort {
    /// Creates a gateway order
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, PortError>;

    /// Fetches the gateway's view of a payment
    async fn fetch_payment(&self, payment_id: &GatewayPaymentId) -> Result<GatewayPaymentDetails, PortError>;

    /// Issues a refund against a captured payment
    async fn refund(&self, request: &RefundRequest) -> Result<GatewayRefund, PortError>;
}
