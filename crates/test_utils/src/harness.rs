//! Service Harness
//!
//! Wires a `PaymentService` against the in-memory store, the scripted mock
//! gateway, a recording notifier and in-memory metrics, and exposes the
//! pieces so tests can script the gateway and inspect state.

use std::sync::Arc;

use core_kernel::metrics::InMemoryMetrics;
use core_kernel::{GatewayOrderId, GatewayPaymentId, InvoiceId, Money};
use domain_payments::gateway::GatewayConfig;
use domain_payments::mock::{FailingNotifier, MockGateway, RecordingNotifier};
use domain_payments::signature::{callback_signature, sign};
use domain_payments::{
    InMemoryPaymentStore, Invoice, Notifier, PaymentOrder, PaymentPorts, PaymentResult, PaymentService, Receipt,
};

use crate::fixtures::{GatewayFixtures, IdFixtures};

/// A payment service with inspectable collaborators
pub struct PaymentHarness {
    pub service: Arc<PaymentService>,
    pub store: Arc<InMemoryPaymentStore>,
    pub gateway: Arc<MockGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub metrics: Arc<InMemoryMetrics>,
}

impl Default for PaymentHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentHarness {
    /// Harness with the standard sandbox configuration
    pub fn new() -> Self {
        Self::with_config(GatewayFixtures::config())
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        Self::build(config, notifier.clone(), notifier)
    }

    /// Harness whose notifier fails every delivery
    pub fn with_failing_notifier() -> Self {
        Self::build(
            GatewayFixtures::config(),
            Arc::new(FailingNotifier),
            Arc::new(RecordingNotifier::new()),
        )
    }

    fn build(config: GatewayConfig, wired: Arc<dyn Notifier>, notifier: Arc<RecordingNotifier>) -> Self {
        let store = Arc::new(InMemoryPaymentStore::new());
        let gateway = Arc::new(MockGateway::new());
        let metrics = Arc::new(InMemoryMetrics::new());

        let service = PaymentService::new(PaymentPorts {
            ledger: store.clone(),
            store: store.clone(),
            gateway: gateway.clone(),
            notifier: wired,
            metrics: metrics.clone(),
            config: Arc::new(config),
        });

        Self {
            service: Arc::new(service),
            store,
            gateway,
            notifier,
            metrics,
        }
    }

    /// Stores an invoice and returns its id
    pub async fn seed_invoice(&self, invoice: Invoice) -> InvoiceId {
        let id = invoice.id;
        self.store.seed_invoice(invoice).await;
        id
    }

    /// Current ledger copy of an invoice
    pub async fn invoice(&self, id: InvoiceId) -> Invoice {
        use domain_payments::InvoiceLedger;
        self.store.find_invoice(id).await.expect("invoice was seeded")
    }

    pub async fn orders(&self, invoice_id: InvoiceId) -> Vec<PaymentOrder> {
        self.store.orders_for_invoice(invoice_id).await
    }

    /// Signature the checkout would send for this order and payment
    pub fn callback_signature(&self, order_id: &GatewayOrderId, payment_id: &GatewayPaymentId) -> String {
        callback_signature(order_id.as_str(), payment_id.as_str(), GatewayFixtures::KEY_SECRET)
    }

    /// Captures `amount` at the gateway and delivers a signed success callback
    pub async fn pay(&self, order_id: &GatewayOrderId, amount: Money) -> PaymentResult<(GatewayPaymentId, Receipt)> {
        let payment_id = IdFixtures::new_payment_id();
        self.gateway.capture(order_id, &payment_id, amount).await;
        let signature = self.callback_signature(order_id, &payment_id);
        let receipt = self
            .service
            .handle_payment_success(order_id, &payment_id, &signature)
            .await?;
        Ok((payment_id, receipt))
    }

    /// Serialized webhook body and its signature header value
    pub fn signed_webhook(&self, event: &serde_json::Value) -> (Vec<u8>, String) {
        let body = serde_json::to_vec(event).expect("webhook fixture serializes");
        let signature = sign(&body, GatewayFixtures::WEBHOOK_SECRET);
        (body, signature)
    }
}

/// Gateway webhook body for a payment event
pub fn payment_webhook(event: &str, order_id: &GatewayOrderId, payment_id: &GatewayPaymentId) -> serde_json::Value {
    let mut entity = serde_json::json!({
        "id": payment_id.as_str(),
        "order_id": order_id.as_str(),
        "status": "captured",
    });
    if event == "payment.failed" {
        entity["status"] = "failed".into();
        entity["error_code"] = "BAD_REQUEST_ERROR".into();
        entity["error_description"] = "Payment declined by bank".into();
    }
    serde_json::json!({
        "entity": "event",
        "event": event,
        "payload": { "payment": { "entity": entity } }
    })
}
