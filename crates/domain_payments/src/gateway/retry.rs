//! Bounded retry with exponential backoff for gateway calls

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use core_kernel::PortError;

use crate::error::{PaymentError, PaymentResult};

/// Retry policy for gateway calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay_ms: u64,
    /// Factor applied to the delay after each failed attempt
    pub multiplier: u32,
    /// Upper bound for a single delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            multiplier: 2,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            multiplier: 1,
            max_delay_ms: 0,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier).saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Runs `call` until it succeeds, fails non-transiently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> PaymentResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PortError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => {
                    tracing::debug!(operation, attempt, error = %err, "gateway call failed permanently");
                    return Err(PaymentError::Gateway(err));
                }
                Err(err) if attempt >= max_attempts => {
                    tracing::error!(operation, attempts = attempt, error = %err, "gateway call exhausted retries");
                    return Err(PaymentError::GatewayUnavailable {
                        operation,
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient gateway failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4_000));
        assert_eq!(policy.delay_after(10), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::immediate(3)
            .run("create_order", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(PortError::unavailable("gateway"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: PaymentResult<()> = RetryPolicy::immediate(3)
            .run("fetch_payment", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PortError::connection("reset by peer")) }
            })
            .await;

        assert!(matches!(
            result,
            Err(PaymentError::GatewayUnavailable { attempts: 3, operation: "fetch_payment", .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: PaymentResult<()> = RetryPolicy::immediate(3)
            .run("refund", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PortError::validation("amount exceeds captured")) }
            })
            .await;

        assert!(matches!(result, Err(PaymentError::Gateway(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let started = tokio::time::Instant::now();
        let result: PaymentResult<()> = RetryPolicy::default()
            .run("create_order", || async { Err(PortError::unavailable("gateway")) })
            .await;

        assert!(result.is_err());
        // 1s + 2s between the three attempts
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3_000));
        assert!(elapsed < Duration::from_millis(4_000));
    }
}
