//! Counter sink for payment outcomes
//!
//! The payment core only needs monotonic counters. Services take an
//! `Arc<dyn MetricsSink>` so the server can log counters through tracing while
//! tests assert on exact counts with [`InMemoryMetrics`].

use std::collections::HashMap;
use std::sync::Mutex;

/// Counter incremented when a payment order is created at the gateway
pub const PAYMENT_ORDERS_CREATED: &str = "payment_orders_created_total";
/// Counter incremented when a payment is verified and reconciled
pub const PAYMENTS_SUCCEEDED: &str = "payments_succeeded_total";
/// Counter incremented when a payment order is marked failed
pub const PAYMENTS_FAILED: &str = "payments_failed_total";
/// Counter incremented when a refund is accepted by the gateway
pub const REFUNDS_PROCESSED: &str = "refunds_processed_total";
/// Counter incremented when the sweeper expires an order
pub const ORDERS_EXPIRED: &str = "payment_orders_expired_total";

/// Destination for counter increments
pub trait MetricsSink: Send + Sync {
    /// Adds one to the named counter
    fn increment(&self, name: &str);
}

/// Emits each increment as a structured tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn increment(&self, name: &str) {
        tracing::info!(target: "metrics", counter = name, "counter incremented");
    }
}

/// Keeps counters in memory
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, zero if never incremented
    pub fn count(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .map(|counters| counters.get(name).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, name: &str) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(name.to_string()).or_insert(0) += 1;
        }
    }
}
