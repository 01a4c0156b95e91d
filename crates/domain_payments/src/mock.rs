//! Scriptable test doubles for the gateway and notifier ports

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

use core_kernel::{DomainPort, GatewayOrderId, GatewayPaymentId, GatewayRefundId, Money, PortError};

use crate::gateway::{
    CreateOrderRequest, GatewayOrder, GatewayPaymentDetails, GatewayPaymentStatus, GatewayRefund,
    PaymentGateway, RefundRequest,
};
use crate::notification::{Notifier, PaymentEvent};

/// Captured payment details as the gateway would report them
pub fn captured_payment(order_id: &GatewayOrderId, payment_id: &GatewayPaymentId, amount: Money) -> GatewayPaymentDetails {
    GatewayPaymentDetails {
        id: payment_id.clone(),
        order_id: Some(order_id.clone()),
        status: GatewayPaymentStatus::Captured,
        method: "upi".to_string(),
        amount_minor: amount.minor_units(),
        currency: amount.currency(),
        fee_minor: Some(amount.percentage_bps(200).map(|m| m.minor_units()).unwrap_or(0)),
        tax_minor: None,
        bank: None,
        wallet: None,
        vpa: Some("fleet@okaxis".to_string()),
        error_code: None,
        error_description: None,
    }
}

/// In-process gateway with call counters and queued failures
#[derive(Debug, Default)]
pub struct MockGateway {
    sequence: AtomicU32,
    create_calls: AtomicU32,
    fetch_calls: AtomicU32,
    refund_calls: AtomicU32,
    create_failures: Mutex<VecDeque<PortError>>,
    fetch_failures: Mutex<VecDeque<PortError>>,
    refund_failures: Mutex<VecDeque<PortError>>,
    create_requests: Mutex<Vec<CreateOrderRequest>>,
    refund_requests: Mutex<Vec<RefundRequest>>,
    payments: Mutex<HashMap<GatewayPaymentId, GatewayPaymentDetails>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next create call fail with `err`
    pub async fn fail_next_create(&self, err: PortError) {
        self.create_failures.lock().await.push_back(err);
    }

    pub async fn fail_next_fetch(&self, err: PortError) {
        self.fetch_failures.lock().await.push_back(err);
    }

    pub async fn fail_next_refund(&self, err: PortError) {
        self.refund_failures.lock().await.push_back(err);
    }

    /// Registers what `fetch_payment` returns for a payment id
    pub async fn set_payment(&self, details: GatewayPaymentDetails) {
        self.payments.lock().await.insert(details.id.clone(), details);
    }

    /// Registers a captured payment for an order
    pub async fn capture(&self, order_id: &GatewayOrderId, payment_id: &GatewayPaymentId, amount: Money) {
        self.set_payment(captured_payment(order_id, payment_id, amount)).await;
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> u32 {
        self.refund_calls.load(Ordering::SeqCst)
    }

    pub async fn last_create_request(&self) -> Option<CreateOrderRequest> {
        self.create_requests.lock().await.last().cloned()
    }

    pub async fn refund_requests(&self) -> Vec<RefundRequest> {
        self.refund_requests.lock().await.clone()
    }
}

impl DomainPort for MockGateway {}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, PortError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.create_failures.lock().await.pop_front() {
            return Err(err);
        }
        self.create_requests.lock().await.push(request.clone());

        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            id: GatewayOrderId::new(format!("order_mock{:04}", n)),
            status: "created".to_string(),
            amount_minor: request.amount.minor_units(),
            currency: request.amount.currency(),
        })
    }

    async fn fetch_payment(&self, payment_id: &GatewayPaymentId) -> Result<GatewayPaymentDetails, PortError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fetch_failures.lock().await.pop_front() {
            return Err(err);
        }
        self.payments
            .lock()
            .await
            .get(payment_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Payment", payment_id))
    }

    async fn refund(&self, request: &RefundRequest) -> Result<GatewayRefund, PortError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.refund_failures.lock().await.pop_front() {
            return Err(err);
        }
        self.refund_requests.lock().await.push(request.clone());

        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayRefund {
            id: GatewayRefundId::new(format!("rfnd_mock{:04}", n)),
            status: "processed".to_string(),
            amount_minor: request.amount.minor_units(),
        })
    }
}

/// Notifier that keeps every delivery for inspection
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    in_app: Mutex<Vec<PaymentEvent>>,
    emails: Mutex<Vec<String>>,
    delivered: Notify,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn in_app_events(&self) -> Vec<PaymentEvent> {
        self.in_app.lock().await.clone()
    }

    pub async fn emails(&self) -> Vec<String> {
        self.emails.lock().await.clone()
    }

    /// Waits until at least `count` in-app events arrived, false on timeout
    pub async fn wait_for_events(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.delivered.notified();
                if self.in_app.lock().await.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

impl DomainPort for RecordingNotifier {}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn record_in_app(&self, event: &PaymentEvent) -> Result<(), PortError> {
        self.in_app.lock().await.push(event.clone());
        self.delivered.notify_waiters();
        Ok(())
    }

    async fn send_email(&self, to: &str, _event: &PaymentEvent) -> Result<(), PortError> {
        self.emails.lock().await.push(to.to_string());
        Ok(())
    }
}

/// Notifier whose every call fails
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingNotifier;

impl DomainPort for FailingNotifier {}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn record_in_app(&self, _event: &PaymentEvent) -> Result<(), PortError> {
        Err(PortError::unavailable("notification-service"))
    }

    async fn send_email(&self, _to: &str, _event: &PaymentEvent) -> Result<(), PortError> {
        Err(PortError::connection("smtp relay refused connection"))
    }
}
