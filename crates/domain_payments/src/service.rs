//! Payment service facade
//!
//! This module ties the order state machine, the read views and the
//! notification trigger into the operations the API layer calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use core_kernel::metrics::MetricsSink;
use core_kernel::{Currency, GatewayOrderId, GatewayPaymentId, InvoiceId, Money};

use crate::error::{PaymentError, PaymentResult};
use crate::gateway::{CustomerContact, GatewayAdapter, GatewayConfig, PaymentGateway};
use crate::history::{PaymentStats, PaymentStatusView};
use crate::invoice::InvoiceLedger;
use crate::notification::{NotificationTrigger, Notifier, PaymentEvent};
use crate::order::PaymentOrder;
use crate::orders::{FailureOutcome, FailureReport, Initiation, OrderStateMachine, RefundOutcome, SettleOutcome};
use crate::payment::{Payment, RefundSpeed};
use crate::reconciler::Receipt;
use crate::signature::SignatureVerifier;
use crate::store::{PaymentQuery, PaymentStore};
use crate::sweeper::{ExpirySweeper, SweeperConfig};
use crate::webhook::{WebhookEvent, WebhookOutcome};

/// Collaborators the service is wired with
#[derive(Clone)]
pub struct PaymentPorts {
    pub ledger: Arc<dyn InvoiceLedger>,
    pub store: Arc<dyn PaymentStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Arc<dyn MetricsSink>,
    pub config: Arc<GatewayConfig>,
}

/// What the client needs to open the gateway checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub invoice_id: InvoiceId,
    pub gateway_order_id: GatewayOrderId,
    pub amount_to_pay: Money,
    pub currency: Currency,
    pub is_partial: bool,
    pub expires_at: DateTime<Utc>,
    /// Public key id for the checkout widget
    pub key_id: String,
    /// True if an already open order was returned
    pub reused: bool,
}

impl CheckoutSession {
    fn new(initiation: Initiation, key_id: &str) -> Self {
        let order = initiation.order;
        Self {
            invoice_id: order.invoice_id,
            gateway_order_id: order.gateway_order_id,
            amount_to_pay: order.amount,
            currency: order.amount.currency(),
            is_partial: initiation.is_partial,
            expires_at: order.expires_at,
            key_id: key_id.to_string(),
            reused: initiation.reused,
        }
    }
}

/// Entry point for invoice payments
pub struct PaymentService {
    orders: Arc<OrderStateMachine>,
    ledger: Arc<dyn InvoiceLedger>,
    store: Arc<dyn PaymentStore>,
    notifications: NotificationTrigger,
    default_currency: Currency,
}

impl PaymentService {
    pub fn new(ports: PaymentPorts) -> Self {
        let verifier = SignatureVerifier::from_config(&ports.config);
        let default_currency = ports.config.currency;
        let adapter = GatewayAdapter::new(ports.gateway, ports.config, Arc::clone(&ports.metrics));
        let orders = OrderStateMachine::new(
            Arc::clone(&ports.ledger),
            Arc::clone(&ports.store),
            adapter,
            verifier,
            ports.metrics,
        );
        Self {
            orders: Arc::new(orders),
            ledger: ports.ledger,
            store: ports.store,
            notifications: NotificationTrigger::new(ports.notifier),
            default_currency,
        }
    }

    /// Sweeper sharing this service's state machine
    pub fn sweeper(&self, config: SweeperConfig) -> ExpirySweeper {
        ExpirySweeper::new(Arc::clone(&self.orders), config)
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    /// Starts or resumes a payment for an invoice
    ///
    /// # Arguments
    ///
    /// * `invoice_id` - Invoice to collect against
    /// * `amount` - Partial amount; the full remaining balance when `None`
    /// * `customer` - Contact forwarded to the checkout; the invoice's when `None`
    ///
    /// # Errors
    ///
    /// `InvoiceNotFound`, `InvalidState` for paid/cancelled/draft invoices,
    /// `Validation` for amounts outside `(0, remaining]`, and
    /// `GatewayUnavailable` if order creation keeps failing.
    pub async fn initiate_payment(
        &self,
        invoice_id: InvoiceId,
        amount: Option<Money>,
        customer: Option<CustomerContact>,
    ) -> PaymentResult<CheckoutSession> {
        let initiation = self.orders.initiate(invoice_id, amount, customer.as_ref()).await?;
        Ok(CheckoutSession::new(initiation, self.orders.gateway().key_id()))
    }

    /// Abandons the open order and starts a new one for the full balance
    pub async fn retry_payment(
        &self,
        invoice_id: InvoiceId,
        customer: Option<CustomerContact>,
    ) -> PaymentResult<CheckoutSession> {
        let initiation = self.orders.retry(invoice_id, customer.as_ref()).await?;
        Ok(CheckoutSession::new(initiation, self.orders.gateway().key_id()))
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Handles the checkout success callback
    ///
    /// Redelivery of the same callback returns the receipt issued the first
    /// time without crediting the invoice again.
    pub async fn handle_payment_success(
        &self,
        gateway_order_id: &GatewayOrderId,
        payment_id: &GatewayPaymentId,
        signature: &str,
    ) -> PaymentResult<Receipt> {
        match self
            .orders
            .verify_and_settle(gateway_order_id, payment_id, signature)
            .await?
        {
            SettleOutcome::Settled { receipt, invoice, .. } => {
                self.notifications.fire(PaymentEvent::Succeeded {
                    receipt: receipt.clone(),
                    customer_email: invoice.customer_email,
                });
                Ok(receipt)
            }
            SettleOutcome::Duplicate { receipt } => Ok(receipt),
            SettleOutcome::SignatureRejected { .. } => Err(PaymentError::SignatureInvalid {
                order_id: gateway_order_id.to_string(),
            }),
            SettleOutcome::NotCaptured { status, .. } => Err(PaymentError::PaymentNotCaptured {
                status: status.as_str().to_string(),
            }),
        }
    }

    /// Handles the checkout failure callback
    pub async fn handle_payment_failure(
        &self,
        gateway_order_id: &GatewayOrderId,
        report: &FailureReport,
        payment_id: Option<&GatewayPaymentId>,
    ) -> PaymentResult<PaymentOrder> {
        match self.orders.mark_failed(gateway_order_id, report, payment_id).await? {
            FailureOutcome::Recorded(order) => {
                self.notify_failure(&order).await;
                Ok(order)
            }
            FailureOutcome::AlreadyFinal(order) => Ok(order),
        }
    }

    /// Verifies and dispatches a gateway webhook
    ///
    /// Unknown event types and events for orders this core never created
    /// are acknowledged so the gateway stops redelivering them.
    pub async fn handle_webhook(&self, body: &[u8], signature: &str) -> PaymentResult<WebhookOutcome> {
        if !self.orders.verifier().verify_webhook(body, signature)? {
            return Err(PaymentError::SignatureInvalid {
                order_id: "webhook".to_string(),
            });
        }

        let event = WebhookEvent::parse(body)?;
        tracing::info!(event = event.name(), "webhook received");

        let outcome = match event {
            WebhookEvent::PaymentCaptured { order_id, payment_id }
            | WebhookEvent::OrderPaid { order_id, payment_id } => {
                match self.orders.settle_authenticated(&order_id, &payment_id).await {
                    Ok(SettleOutcome::Settled { receipt, invoice, .. }) => {
                        self.notifications.fire(PaymentEvent::Succeeded {
                            receipt: receipt.clone(),
                            customer_email: invoice.customer_email,
                        });
                        WebhookOutcome::Settled(receipt)
                    }
                    Ok(SettleOutcome::Duplicate { receipt }) => WebhookOutcome::Duplicate(receipt),
                    Ok(SettleOutcome::NotCaptured { status, .. }) => {
                        tracing::info!(
                            gateway_order_id = %order_id,
                            gateway_status = status.as_str(),
                            "webhook payment not captured yet"
                        );
                        WebhookOutcome::Acknowledged
                    }
                    Ok(SettleOutcome::SignatureRejected { .. }) => WebhookOutcome::Acknowledged,
                    Err(PaymentError::OrderNotFound(id)) => {
                        tracing::warn!(gateway_order_id = %id, "webhook for unknown order acknowledged");
                        WebhookOutcome::Acknowledged
                    }
                    Err(err) => return Err(err),
                }
            }
            WebhookEvent::PaymentFailed {
                order_id,
                payment_id,
                report,
            } => match self.orders.mark_failed(&order_id, &report, Some(&payment_id)).await {
                Ok(FailureOutcome::Recorded(order)) => {
                    self.notify_failure(&order).await;
                    WebhookOutcome::FailureRecorded
                }
                Ok(FailureOutcome::AlreadyFinal(_)) => WebhookOutcome::Acknowledged,
                Err(PaymentError::OrderNotFound(id)) => {
                    tracing::warn!(gateway_order_id = %id, "webhook for unknown order acknowledged");
                    WebhookOutcome::Acknowledged
                }
                Err(err) => return Err(err),
            },
            WebhookEvent::RefundProcessed {
                refund_id,
                payment_id,
                status,
            } => {
                tracing::info!(
                    refund_id = %refund_id,
                    payment_id = %payment_id,
                    status = %status,
                    "gateway confirmed refund"
                );
                WebhookOutcome::Acknowledged
            }
            WebhookEvent::Ignored(name) => {
                tracing::debug!(event = %name, "webhook event ignored");
                WebhookOutcome::Acknowledged
            }
        };
        Ok(outcome)
    }

    async fn notify_failure(&self, order: &PaymentOrder) {
        let customer_email = match self.ledger.find_invoice(order.invoice_id).await {
            Ok(invoice) => invoice.customer_email,
            Err(err) => {
                tracing::warn!(invoice_id = %order.invoice_id, error = %err, "could not load invoice for failure notice");
                None
            }
        };
        self.notifications.fire(PaymentEvent::Failed {
            invoice_id: order.invoice_id,
            gateway_order_id: order.gateway_order_id.clone(),
            reason: order.failure_reason.clone().unwrap_or_default(),
            customer_email,
        });
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current payment state of an invoice
    pub async fn get_payment_status(&self, invoice_id: InvoiceId) -> PaymentResult<PaymentStatusView> {
        let invoice = self.orders.load_invoice(invoice_id).await?;
        let has_pending_order = self
            .store
            .find_created_order(invoice_id)
            .await?
            .is_some_and(|order| !order.is_expired_at(Utc::now()));
        PaymentStatusView::from_invoice(&invoice, has_pending_order)
    }

    /// Completed and failed payment records for an invoice, oldest first
    pub async fn get_payment_history(&self, invoice_id: InvoiceId) -> PaymentResult<Vec<Payment>> {
        self.orders.load_invoice(invoice_id).await?;
        Ok(self.store.list_payments(&PaymentQuery::for_invoice(invoice_id)).await?)
    }

    /// Aggregates payments and refunds matching the query
    ///
    /// Totals are computed in the query's currency, or the gateway's
    /// configured currency when the query names none.
    pub async fn payment_stats(&self, query: PaymentQuery) -> PaymentResult<PaymentStats> {
        let currency = query.currency.unwrap_or(self.default_currency);
        let query = PaymentQuery {
            currency: Some(currency),
            ..query
        };
        let payments = self.store.list_payments(&query).await?;
        let refunds = self.store.list_refunds(&query).await?;
        PaymentStats::aggregate(currency, &payments, &refunds)
    }

    // ========================================================================
    // Refunds and maintenance
    // ========================================================================

    /// Refunds a settled payment, fully when `amount` is `None`
    pub async fn refund(
        &self,
        payment_id: &GatewayPaymentId,
        amount: Option<Money>,
        speed: RefundSpeed,
    ) -> PaymentResult<RefundOutcome> {
        self.orders.refund(payment_id, amount, speed).await
    }

    /// Expires every open order past its expiry
    pub async fn expire_stale_orders(&self, now: DateTime<Utc>) -> PaymentResult<Vec<PaymentOrder>> {
        self.orders.expire(now).await
    }
}
