//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for the payment core. These fixtures are
//! consistent and predictable so assertions can use literal values.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use uuid::Uuid;

use core_kernel::{Currency, GatewayOrderId, GatewayPaymentId, InvoiceId, Money};
use domain_payments::gateway::{CustomerContact, GatewayConfig, RetryPolicy};

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// INR amount in paise
    pub fn inr(paise: i64) -> Money {
        Money::from_minor(paise, Currency::INR).expect("fixture amounts are non-negative")
    }

    /// ₹5000.00, the standard invoice total
    pub fn invoice_total() -> Money {
        Self::inr(500_000)
    }

    /// ₹2000.00, the standard partial payment
    pub fn partial_payment() -> Money {
        Self::inr(200_000)
    }

    pub fn inr_zero() -> Money {
        Money::zero(Currency::INR)
    }

    /// USD amount for currency mismatch tests
    pub fn usd(cents: i64) -> Money {
        Money::from_minor(cents, Currency::USD).expect("fixture amounts are non-negative")
    }
}

static KNOWN_INVOICE_ID: Lazy<InvoiceId> = Lazy::new(|| {
    InvoiceId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440101").expect("valid uuid"))
});

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    /// Deterministic invoice ID
    pub fn invoice_id() -> InvoiceId {
        *KNOWN_INVOICE_ID
    }

    pub fn gateway_order_id() -> GatewayOrderId {
        GatewayOrderId::new("order_IluGWxBm9U8zJ8")
    }

    pub fn gateway_payment_id() -> GatewayPaymentId {
        GatewayPaymentId::new("pay_IH4NVgf4Dreq1l")
    }

    /// A fresh gateway payment id, unique per call
    pub fn new_payment_id() -> GatewayPaymentId {
        GatewayPaymentId::new(format!("pay_{}", &Uuid::new_v4().simple().to_string()[..14]))
    }
}

/// Fixture for gateway credentials and configuration
pub struct GatewayFixtures;

impl GatewayFixtures {
    pub const KEY_ID: &'static str = "rzp_test_1DP5mmOlF5G5ag";
    pub const KEY_SECRET: &'static str = "thisissupersecret";
    pub const WEBHOOK_SECRET: &'static str = "whsec_fleetpay_test";

    /// Enabled sandbox config with immediate retries
    pub fn config() -> GatewayConfig {
        let mut config = GatewayConfig::with_credentials(Self::KEY_ID, Self::KEY_SECRET)
            .with_webhook_secret(Self::WEBHOOK_SECRET);
        config.retry = RetryPolicy::immediate(3);
        config
    }

    /// Config with the gateway switched off
    pub fn disabled_config() -> GatewayConfig {
        GatewayConfig::default()
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Standard invoice due date
    pub fn due_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 31).expect("valid date")
    }

    /// Fixed instant for receipt and window tests
    pub fn billing_run() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).single().expect("valid timestamp")
    }
}

/// Fixture for string test data
pub struct StringFixtures;

impl StringFixtures {
    pub fn invoice_number() -> &'static str {
        "INV-2024-000123"
    }

    pub fn customer_email() -> &'static str {
        "accounts@northwind-fleet.example"
    }

    /// Contact as a client would forward it
    pub fn customer_contact() -> CustomerContact {
        CustomerContact {
            name: Some("Northwind Fleet Services".to_string()),
            email: Some(Self::customer_email().to_string()),
            phone: Some("+919876543210".to_string()),
        }
    }
}
