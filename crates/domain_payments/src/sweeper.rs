//! Background expiry of stale payment orders
//!
//! The sweeper only moves `CREATED` orders past their expiry to `EXPIRED`.
//! It never touches invoices.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::PaymentResult;
use crate::order::PaymentOrder;
use crate::orders::OrderStateMachine;

/// Sweeper schedule
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    /// Seconds between runs
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Periodically expires stale orders
#[derive(Clone)]
pub struct ExpirySweeper {
    orders: Arc<OrderStateMachine>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(orders: Arc<OrderStateMachine>, config: SweeperConfig) -> Self {
        Self { orders, config }
    }

    /// Runs one sweep against `now`
    pub async fn run_once(&self, now: DateTime<Utc>) -> PaymentResult<Vec<PaymentOrder>> {
        let expired = self.orders.expire(now).await?;
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expiry sweep finished");
        } else {
            tracing::debug!("expiry sweep found nothing to expire");
        }
        Ok(expired)
    }

    /// Starts the sweep loop; it stops when `shutdown` flips to true or its sender drops
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if !self.config.enabled {
                tracing::info!("expiry sweeper disabled");
                return;
            }
            let mut timer = tokio::time::interval(self.config.interval());
            tracing::info!(interval_secs = self.config.interval_secs, "expiry sweeper started");
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(err) = self.run_once(Utc::now()).await {
                            tracing::error!(error = %err, "expiry sweep failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("expiry sweeper stopped");
                            return;
                        }
                    }
                }
            }
        })
    }
}
