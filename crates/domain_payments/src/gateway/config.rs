//! Gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use core_kernel::Currency;

use super::retry::RetryPolicy;
use crate::error::{PaymentError, PaymentResult};

/// Credentials, flags and tuning for the payment gateway
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Master switch; when false every gateway call fails fast
    pub enabled: bool,
    /// Sandbox credentials in use
    pub test_mode: bool,
    /// Public key id, also handed to the client checkout
    pub key_id: String,
    /// API secret, also the callback signing secret
    pub key_secret: Option<SecretString>,
    /// Secret used to sign webhook deliveries
    pub webhook_secret: Option<SecretString>,
    /// Verify webhooks with `key_secret` when no webhook secret is set
    pub allow_webhook_secret_fallback: bool,
    /// REST API base URL
    pub base_url: String,
    /// Currency orders are created in
    pub currency: Currency,
    /// Minutes a created order stays payable
    pub order_expiry_minutes: i64,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            test_mode: true,
            key_id: String::new(),
            key_secret: None,
            webhook_secret: None,
            allow_webhook_secret_fallback: false,
            base_url: "https://api.razorpay.com/v1".to_string(),
            currency: Currency::INR,
            order_expiry_minutes: 30,
            request_timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

impl GatewayConfig {
    /// Enabled configuration with the given credentials
    pub fn with_credentials(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            enabled: true,
            key_id: key_id.into(),
            key_secret: Some(SecretString::new(key_secret.into())),
            ..Default::default()
        }
    }

    /// Sets the webhook signing secret
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Checks that outbound calls can be made
    pub fn validate(&self) -> PaymentResult<()> {
        if !self.enabled {
            return Err(PaymentError::configuration("payment gateway is disabled"));
        }
        if self.key_id.trim().is_empty() {
            return Err(PaymentError::configuration("gateway key id is not set"));
        }
        match &self.key_secret {
            Some(secret) if !secret.expose_secret().is_empty() => {}
            _ => return Err(PaymentError::configuration("gateway key secret is not set")),
        }
        if self.base_url.trim().is_empty() {
            return Err(PaymentError::configuration("gateway base url is not set"));
        }
        if self.order_expiry_minutes <= 0 {
            return Err(PaymentError::configuration("order expiry must be positive"));
        }
        Ok(())
    }

    /// True when validation passes
    pub fn is_configured(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn order_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.order_expiry_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disabled() {
        let config = GatewayConfig::default();
        assert!(matches!(config.validate(), Err(PaymentError::Configuration(_))));
        assert_eq!(config.order_expiry_minutes, 30);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_with_credentials_validates() {
        let config = GatewayConfig::with_credentials("rzp_test_key", "s3cret");
        assert!(config.is_configured());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let config = GatewayConfig::with_credentials("rzp_test_key", "");
        assert!(!config.is_configured());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = GatewayConfig::with_credentials("rzp_test_key", "s3cret").with_webhook_secret("whsec");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("whsec"));
    }
}
