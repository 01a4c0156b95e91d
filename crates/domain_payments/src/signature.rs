//! HMAC-SHA256 verification for gateway callbacks and webhooks
//!
//! Checkout callbacks are signed over `order_id|payment_id` with the API key
//! secret. Webhook deliveries are signed over the raw request body with a
//! separate webhook secret. Digests are compared in constant time and a
//! mismatch is reported as `false`, never as an error.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{PaymentError, PaymentResult};
use crate::gateway::GatewayConfig;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload`
pub fn sign(payload: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Signature a checkout callback carries for this order and payment
pub fn callback_signature(order_id: &str, payment_id: &str, secret: &str) -> String {
    sign(format!("{}|{}", order_id, payment_id).as_bytes(), secret)
}

/// Verifies an arbitrary payload against a hex signature
pub fn verify_payload(payload: &[u8], signature: &str, secret: &str) -> bool {
    let provided = match hex::decode(signature.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    let expected = mac.finalize().into_bytes();
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

/// Verifies a checkout callback signature over `order_id|payment_id`
pub fn verify_signature(order_id: &str, payment_id: &str, signature: &str, secret: &str) -> bool {
    verify_payload(format!("{}|{}", order_id, payment_id).as_bytes(), signature, secret)
}

/// Holds the secrets used to authenticate inbound gateway traffic
pub struct SignatureVerifier {
    key_secret: Option<SecretString>,
    webhook_secret: Option<SecretString>,
    allow_webhook_fallback: bool,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("has_key_secret", &self.key_secret.is_some())
            .field("has_webhook_secret", &self.webhook_secret.is_some())
            .field("allow_webhook_fallback", &self.allow_webhook_fallback)
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(
        key_secret: Option<SecretString>,
        webhook_secret: Option<SecretString>,
        allow_webhook_fallback: bool,
    ) -> Self {
        Self {
            key_secret,
            webhook_secret,
            allow_webhook_fallback,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        let copy = |secret: &Option<SecretString>| {
            secret
                .as_ref()
                .map(|s| SecretString::new(s.expose_secret().clone()))
        };
        Self::new(
            copy(&config.key_secret),
            copy(&config.webhook_secret),
            config.allow_webhook_secret_fallback,
        )
    }

    /// Verifies a checkout callback
    ///
    /// Errors only when no key secret is configured.
    pub fn verify_payment(&self, order_id: &str, payment_id: &str, signature: &str) -> PaymentResult<bool> {
        let secret = non_empty(&self.key_secret)
            .ok_or_else(|| PaymentError::configuration("callback verification requires a key secret"))?;
        let valid = verify_signature(order_id, payment_id, signature, secret);
        if !valid {
            tracing::warn!(order_id, payment_id, "callback signature mismatch");
        }
        Ok(valid)
    }

    /// Verifies a webhook delivery's raw body
    ///
    /// Falls back to the key secret only when explicitly allowed.
    pub fn verify_webhook(&self, payload: &[u8], signature: &str) -> PaymentResult<bool> {
        let secret = match non_empty(&self.webhook_secret) {
            Some(secret) => secret,
            None if self.allow_webhook_fallback => {
                tracing::warn!("webhook secret not configured, verifying with the key secret");
                non_empty(&self.key_secret).ok_or_else(|| {
                    PaymentError::configuration("webhook verification requires a webhook or key secret")
                })?
            }
            None => {
                return Err(PaymentError::configuration(
                    "webhook verification requires a webhook secret",
                ))
            }
        };
        let valid = verify_payload(payload, signature, secret);
        if !valid {
            tracing::warn!(payload_len = payload.len(), "webhook signature mismatch");
        }
        Ok(valid)
    }
}

fn non_empty(secret: &Option<SecretString>) -> Option<&str> {
    secret
        .as_ref()
        .map(|s| s.expose_secret().as_str())
        .filter(|s| !s.is_empty())
}
