//! Gateway adapter used by the order state machine

use std::collections::BTreeMap;
use std::sync::Arc;

use core_kernel::metrics::{self, MetricsSink};
use core_kernel::{GatewayPaymentId, InvoiceId, Money};

use super::{
    CreateOrderRequest, CustomerContact, GatewayConfig, GatewayOrder, GatewayPaymentDetails,
    GatewayRefund, PaymentGateway, RefundRequest,
};
use crate::error::{PaymentError, PaymentResult};
use crate::payment::RefundSpeed;

/// Validated, retried access to a [`PaymentGateway`]
#[derive(Clone)]
pub struct GatewayAdapter {
    gateway: Arc<dyn PaymentGateway>,
    config: Arc<GatewayConfig>,
    metrics: Arc<dyn MetricsSink>,
}

impl GatewayAdapter {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        config: Arc<GatewayConfig>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            gateway,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Public key id for client checkout
    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    /// Creates a gateway order for an invoice
    pub async fn create_order(
        &self,
        invoice_id: InvoiceId,
        invoice_number: &str,
        amount: Money,
        customer: Option<&CustomerContact>,
        extra_notes: BTreeMap<String, String>,
    ) -> PaymentResult<GatewayOrder> {
        self.config.validate()?;
        if amount.currency() != self.config.currency {
            return Err(PaymentError::validation(format!(
                "gateway is configured for {}, invoice is in {}",
                self.config.currency,
                amount.currency()
            )));
        }

        let mut notes = extra_notes;
        notes.insert("invoice_id".to_string(), invoice_id.as_uuid().to_string());
        notes.insert("invoice_number".to_string(), invoice_number.to_string());
        if let Some(contact) = customer {
            if let Some(name) = &contact.name {
                notes.insert("customer_name".to_string(), name.clone());
            }
            if let Some(email) = &contact.email {
                notes.insert("customer_email".to_string(), email.clone());
            }
            if let Some(phone) = &contact.phone {
                notes.insert("customer_phone".to_string(), phone.clone());
            }
        }

        let request = CreateOrderRequest {
            amount,
            receipt: receipt_reference(invoice_number),
            notes,
        };

        let order = self
            .config
            .retry
            .run("create_order", || self.gateway.create_order(&request))
            .await?;

        self.metrics.increment(metrics::PAYMENT_ORDERS_CREATED);
        tracing::info!(
            invoice_id = %invoice_id,
            gateway_order_id = %order.id,
            amount = amount.minor_units(),
            test_mode = self.config.test_mode,
            "gateway order created"
        );
        Ok(order)
    }

    /// Fetches authoritative payment details
    pub async fn fetch_payment(&self, payment_id: &GatewayPaymentId) -> PaymentResult<GatewayPaymentDetails> {
        self.config.validate()?;
        self.config
            .retry
            .run("fetch_payment", || self.gateway.fetch_payment(payment_id))
            .await
            .map_err(|err| match err {
                PaymentError::Gateway(port) if port.is_not_found() => {
                    PaymentError::PaymentNotFound(payment_id.to_string())
                }
                other => other,
            })
    }

    /// Issues a refund
    pub async fn refund(
        &self,
        payment_id: &GatewayPaymentId,
        amount: Money,
        speed: RefundSpeed,
    ) -> PaymentResult<GatewayRefund> {
        self.config.validate()?;
        let request = RefundRequest {
            payment_id: payment_id.clone(),
            amount,
            speed,
        };

        let refund = self
            .config
            .retry
            .run("refund", || self.gateway.refund(&request))
            .await?;

        self.metrics.increment(metrics::REFUNDS_PROCESSED);
        tracing::info!(
            payment_id = %payment_id,
            refund_id = %refund.id,
            amount = amount.minor_units(),
            "gateway refund issued"
        );
        Ok(refund)
    }
}

/// Receipt reference sent with the order, at most 40 characters
fn receipt_reference(invoice_number: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("rcpt_{}_{}", invoice_number, &suffix[..8])
        .chars()
        .take(40)
        .collect()
}
