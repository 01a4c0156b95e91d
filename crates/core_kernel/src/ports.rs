//! Ports and Adapters Infrastructure
//!
//! The domain crate owns the port traits (invoice ledger, order store,
//! payment gateway, notifier). Adapters implement them against PostgreSQL,
//! the gateway's REST API, or in-memory maps for tests.
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │        PaymentService         │
//!                 └──────────────────────────────┘
//!                    │            │            │
//!                    ▼            ▼            ▼
//!            InvoiceLedger   PaymentStore   PaymentGateway
//!                    ▲            ▲            ▲
//!           ┌────────┴───┐ ┌──────┴─────┐ ┌────┴──────────┐
//!           │ PostgreSQL │ │ In-memory  │ │ REST / Mock   │
//!           └────────────┘ └────────────┘ └───────────────┘
//! ```
//!
//! All adapters fail with [`PortError`]. [`PortError::is_transient`] is the
//! one question the gateway retry loop and the HTTP layer ask of it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by any adapter
#[derive(Debug, Error)]
pub enum PortError {
    #[error("{entity_type} {id} not found")]
    NotFound { entity_type: String, id: String },

    /// Rejected by the other side as malformed; `field` names the offending
    /// input when the remote reports it
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Unique key or optimistic version clash
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Credentials were refused
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("{service} is unavailable")]
    ServiceUnavailable { service: String },

    /// A remote response did not decode into domain types
    #[error("Transformation error: {message}")]
    Transformation { message: String },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn unavailable(service: impl Into<String>) -> Self {
        PortError::ServiceUnavailable {
            service: service.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// True if the same call may succeed when repeated
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. }
                | PortError::Timeout { .. }
                | PortError::RateLimited { .. }
                | PortError::ServiceUnavailable { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }
}

/// Marker for port traits; ports are shared across tasks behind `Arc`
pub trait DomainPort: Send + Sync + 'static {}

/// Health of one adapter as reported to the readiness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    Unhealthy,
}

/// Outcome of a single adapter health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    /// Failure reason when unhealthy
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn healthy(adapter_id: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Healthy,
            latency_ms,
            message: None,
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(adapter_id: impl Into<String>, latency_ms: u64, message: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Unhealthy,
            latency_ms,
            message: Some(message.into()),
            checked_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == AdapterHealth::Healthy
    }
}

/// Adapters that can probe their backing system
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}
