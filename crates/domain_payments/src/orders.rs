//! Payment order state machine
//!
//! Owns every write to `PaymentOrder`. Each transition re-reads the order,
//! checks its current status, and commits through the store's version check,
//! so a duplicate or concurrent callback can never apply a second forward
//! transition. Losing a version race is treated as "someone else already
//! recorded the outcome" and the recorded outcome is returned.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use core_kernel::metrics::{self, MetricsSink};
use core_kernel::{GatewayOrderId, GatewayPaymentId, InvoiceId, Money, RefundRecordId};

use crate::error::{PaymentError, PaymentResult};
use crate::gateway::{CustomerContact, GatewayAdapter, GatewayPaymentDetails, GatewayPaymentStatus};
use crate::invoice::{Invoice, InvoiceLedger, InvoiceStatus};
use crate::order::{OrderStatus, PaymentMethodDetails, PaymentOrder, SIGNATURE_INVALID};
use crate::payment::{Payment, PaymentMethod, PaymentStatus, RefundRecord, RefundSpeed};
use crate::reconciler::{InvoiceReconciler, Receipt};
use crate::signature::SignatureVerifier;
use crate::store::{InsertOutcome, PaymentQuery, PaymentStore, Settlement};

/// Attempts at booking a refund locally after the gateway accepted it
const REFUND_BOOKING_ATTEMPTS: u32 = 3;

/// Initiation passes before giving up on an invoice that keeps changing
const INITIATE_ATTEMPTS: u32 = 2;

/// Result of `initiate`
#[derive(Debug, Clone, PartialEq)]
pub struct Initiation {
    pub order: PaymentOrder,
    /// True if an existing `CREATED` order was returned
    pub reused: bool,
    /// True if the order covers less than the remaining balance
    pub is_partial: bool,
}

/// Result of a settlement attempt
#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    /// This call moved the order to `PAID` and credited the invoice
    Settled {
        receipt: Receipt,
        order: PaymentOrder,
        invoice: Invoice,
    },
    /// The order had already been settled; the stored receipt is returned
    Duplicate { receipt: Receipt },
    /// The callback signature did not verify; the order is `FAILED` if it was `CREATED`
    SignatureRejected { order: PaymentOrder },
    /// The gateway does not report the payment as captured; the order stays `CREATED`
    NotCaptured { status: GatewayPaymentStatus, order: PaymentOrder },
}

/// Result of `mark_failed`
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// This call moved the order to `FAILED`
    Recorded(PaymentOrder),
    /// The order had already left `CREATED`
    AlreadyFinal(PaymentOrder),
}

/// Result of a refund
#[derive(Debug, Clone, PartialEq)]
pub struct RefundOutcome {
    pub refund: RefundRecord,
    pub order: PaymentOrder,
}

/// Gateway failure details reported by the checkout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureReport {
    pub error_code: String,
    pub error_description: String,
    pub error_reason: Option<String>,
}

impl FailureReport {
    fn summary(&self) -> String {
        match &self.error_reason {
            Some(reason) => format!("{}: {} ({})", self.error_code, self.error_description, reason),
            None => format!("{}: {}", self.error_code, self.error_description),
        }
    }
}

/// Lifecycle operations for payment orders
pub struct OrderStateMachine {
    ledger: Arc<dyn InvoiceLedger>,
    store: Arc<dyn PaymentStore>,
    gateway: GatewayAdapter,
    verifier: SignatureVerifier,
    metrics: Arc<dyn MetricsSink>,
}

impl OrderStateMachine {
    pub fn new(
        ledger: Arc<dyn InvoiceLedger>,
        store: Arc<dyn PaymentStore>,
        gateway: GatewayAdapter,
        verifier: SignatureVerifier,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            ledger,
            store,
            gateway,
            verifier,
            metrics,
        }
    }

    pub fn gateway(&self) -> &GatewayAdapter {
        &self.gateway
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    pub(crate) async fn load_invoice(&self, id: InvoiceId) -> PaymentResult<Invoice> {
        self.ledger.find_invoice(id).await.map_err(|err| {
            if err.is_not_found() {
                PaymentError::InvoiceNotFound(id)
            } else {
                PaymentError::Persistence(err)
            }
        })
    }

    pub(crate) async fn load_order(&self, gateway_order_id: &GatewayOrderId) -> PaymentResult<PaymentOrder> {
        self.store
            .find_order_by_gateway_id(gateway_order_id)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    PaymentError::OrderNotFound(gateway_order_id.to_string())
                } else {
                    PaymentError::Persistence(err)
                }
            })
    }

    // ========================================================================
    // Initiation
    // ========================================================================

    /// Returns the invoice's open order or creates one at the gateway
    pub async fn initiate(
        &self,
        invoice_id: InvoiceId,
        amount: Option<Money>,
        customer: Option<&CustomerContact>,
    ) -> PaymentResult<Initiation> {
        for _ in 0..INITIATE_ATTEMPTS {
            if let Some(initiation) = self.try_initiate(invoice_id, amount, customer).await? {
                return Ok(initiation);
            }
        }
        Err(PaymentError::Conflict(format!(
            "invoice {} kept changing during initiation",
            invoice_id
        )))
    }

    /// `None` when a stale open order was finished by another writer, which
    /// makes the invoice read stale as well
    async fn try_initiate(
        &self,
        invoice_id: InvoiceId,
        amount: Option<Money>,
        customer: Option<&CustomerContact>,
    ) -> PaymentResult<Option<Initiation>> {
        let invoice = self.load_invoice(invoice_id).await?;
        match invoice.status {
            InvoiceStatus::Paid => {
                return Err(PaymentError::invalid_state(format!(
                    "invoice {} is already paid",
                    invoice.invoice_number
                )))
            }
            InvoiceStatus::Cancelled => {
                return Err(PaymentError::invalid_state(format!(
                    "invoice {} is cancelled",
                    invoice.invoice_number
                )))
            }
            InvoiceStatus::Draft => {
                return Err(PaymentError::invalid_state(format!(
                    "invoice {} has not been issued",
                    invoice.invoice_number
                )))
            }
            InvoiceStatus::Pending | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue => {}
        }

        let remaining = invoice.remaining_amount()?;
        if !remaining.is_positive() {
            return Err(PaymentError::invalid_state(format!(
                "invoice {} has no outstanding balance",
                invoice.invoice_number
            )));
        }

        let charge = match amount {
            Some(requested) => {
                if requested.currency() != remaining.currency() {
                    return Err(PaymentError::validation(format!(
                        "amount currency {} does not match invoice currency {}",
                        requested.currency(),
                        remaining.currency()
                    )));
                }
                if !requested.is_positive() {
                    return Err(PaymentError::validation("amount must be greater than zero"));
                }
                if requested > remaining {
                    return Err(PaymentError::validation(format!(
                        "amount {} exceeds remaining balance {}",
                        requested, remaining
                    )));
                }
                requested
            }
            None => remaining,
        };

        if let Some(existing) = self.store.find_created_order(invoice_id).await? {
            if existing.is_expired_at(Utc::now()) {
                if self.expire_order(existing.clone()).await?.is_none() {
                    let current = self.store.find_order(existing.id).await?;
                    if !current.status.is_terminal_for_payment() {
                        return Err(PaymentError::Conflict(format!(
                            "order {} changed during initiation",
                            existing.gateway_order_id
                        )));
                    }
                    tracing::info!(
                        invoice_id = %invoice_id,
                        gateway_order_id = %current.gateway_order_id,
                        status = %current.status,
                        "stale order finished concurrently, re-reading invoice"
                    );
                    return Ok(None);
                }
            } else {
                tracing::info!(
                    invoice_id = %invoice_id,
                    gateway_order_id = %existing.gateway_order_id,
                    "reusing open payment order"
                );
                let is_partial = existing.amount < remaining;
                return Ok(Some(Initiation {
                    order: existing,
                    reused: true,
                    is_partial,
                }));
            }
        }

        let billed = CustomerContact {
            name: invoice.customer_name.clone(),
            email: invoice.customer_email.clone(),
            phone: invoice.customer_phone.clone(),
        };
        let contact = customer.unwrap_or(&billed);
        let gateway_order = self
            .gateway
            .create_order(invoice_id, &invoice.invoice_number, charge, Some(contact), BTreeMap::new())
            .await?;
        let expires_at = Utc::now() + self.gateway.config().order_ttl();
        let receipt = format!("inv_{}", invoice.invoice_number);
        let order = PaymentOrder::new(invoice_id, gateway_order.id, charge, receipt, expires_at);

        match self.store.insert_order(order).await? {
            InsertOutcome::Inserted(order) => {
                tracing::info!(
                    invoice_id = %invoice_id,
                    gateway_order_id = %order.gateway_order_id,
                    amount = charge.minor_units(),
                    expires_at = %order.expires_at,
                    "payment order created"
                );
                Ok(Some(Initiation {
                    is_partial: charge < remaining,
                    order,
                    reused: false,
                }))
            }
            InsertOutcome::Existing(existing) => {
                tracing::warn!(
                    invoice_id = %invoice_id,
                    gateway_order_id = %existing.gateway_order_id,
                    "concurrent initiation won, returning its order"
                );
                let is_partial = existing.amount < remaining;
                Ok(Some(Initiation {
                    order: existing,
                    reused: true,
                    is_partial,
                }))
            }
        }
    }

    // ========================================================================
    // Settlement
    // ========================================================================

    /// Verifies a checkout callback and settles the order
    pub async fn verify_and_settle(
        &self,
        gateway_order_id: &GatewayOrderId,
        payment_id: &GatewayPaymentId,
        signature: &str,
    ) -> PaymentResult<SettleOutcome> {
        let order = self.load_order(gateway_order_id).await?;

        let valid = self
            .verifier
            .verify_payment(gateway_order_id.as_str(), payment_id.as_str(), signature)?;
        if !valid {
            return self.reject_signature(order, payment_id).await;
        }

        self.settle(order, payment_id, Some(signature)).await
    }

    /// Settles an order whose authenticity was established by a signed webhook
    pub async fn settle_authenticated(
        &self,
        gateway_order_id: &GatewayOrderId,
        payment_id: &GatewayPaymentId,
    ) -> PaymentResult<SettleOutcome> {
        let order = self.load_order(gateway_order_id).await?;
        self.settle(order, payment_id, None).await
    }

    async fn reject_signature(&self, order: PaymentOrder, payment_id: &GatewayPaymentId) -> PaymentResult<SettleOutcome> {
        tracing::warn!(
            gateway_order_id = %order.gateway_order_id,
            payment_id = %payment_id,
            status = %order.status,
            "rejecting callback with invalid signature"
        );
        if order.status.is_terminal_for_payment() {
            return Ok(SettleOutcome::SignatureRejected { order });
        }

        let mut failed = order.clone();
        failed.mark_failed(SIGNATURE_INVALID, "callback signature did not verify")?;
        let audit = Payment::failed(
            order.invoice_id,
            order.id,
            order.amount,
            Some(payment_id.clone()),
            SIGNATURE_INVALID,
        );
        match self.store.commit_failure(&failed, &audit).await {
            Ok(stored) => {
                self.metrics.increment(metrics::PAYMENTS_FAILED);
                Ok(SettleOutcome::SignatureRejected { order: stored })
            }
            Err(err) if err.is_conflict() => {
                let current = self.store.find_order(order.id).await?;
                Ok(SettleOutcome::SignatureRejected { order: current })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn settle(
        &self,
        order: PaymentOrder,
        payment_id: &GatewayPaymentId,
        signature: Option<&str>,
    ) -> PaymentResult<SettleOutcome> {
        if order.status.is_terminal_for_payment() {
            return self.recorded_outcome(order, payment_id).await;
        }

        let details = self.gateway.fetch_payment(payment_id).await?;
        if let Some(reported) = &details.order_id {
            if reported != &order.gateway_order_id {
                return Err(PaymentError::validation(format!(
                    "payment {} belongs to order {}, not {}",
                    payment_id, reported, order.gateway_order_id
                )));
            }
        }

        if details.status != GatewayPaymentStatus::Captured {
            return self.record_gateway_status(order, &details, signature).await;
        }

        let captured = Money::from_minor(details.amount_minor, details.currency)?;
        if captured.currency() != order.currency() {
            return Err(PaymentError::validation(format!(
                "captured currency {} does not match order currency {}",
                captured.currency(),
                order.currency()
            )));
        }
        if captured < order.amount {
            tracing::warn!(
                gateway_order_id = %order.gateway_order_id,
                captured = captured.minor_units(),
                expected = order.amount.minor_units(),
                "gateway captured less than the order amount"
            );
        }

        let invoice = self.load_invoice(order.invoice_id).await?;
        let credited = InvoiceReconciler::apply_payment(&invoice, captured).map_err(|err| {
            tracing::error!(
                gateway_order_id = %order.gateway_order_id,
                invoice_id = %invoice.id,
                error = %err,
                "reconciliation failed, order left unsettled"
            );
            err
        })?;

        let method = PaymentMethod::from_gateway(&details.method);
        let currency = order.currency();
        let method_details = PaymentMethodDetails {
            method,
            bank: details.bank.clone(),
            wallet: details.wallet.clone(),
            vpa: details.vpa.clone(),
            fee: details.fee_minor.map(|m| Money::from_minor(m, currency)).transpose()?,
            tax: details.tax_minor.map(|m| Money::from_minor(m, currency)).transpose()?,
        };

        let mut paid = order.clone();
        paid.record_signature(signature, true);
        paid.mark_paid(payment_id.clone(), captured, method_details)?;

        let payment = Payment::completed(order.invoice_id, order.id, captured, method, payment_id.clone());
        let receipt = InvoiceReconciler::receipt(&invoice, &credited, &paid, &payment)?;
        let settlement = Settlement {
            order: paid,
            payment,
            invoice: credited.clone(),
            receipt: receipt.clone(),
        };

        match self.store.commit_settlement(&settlement).await {
            Ok(stored) => {
                self.metrics.increment(metrics::PAYMENTS_SUCCEEDED);
                tracing::info!(
                    gateway_order_id = %stored.gateway_order_id,
                    payment_id = %payment_id,
                    invoice_id = %credited.id,
                    amount = captured.minor_units(),
                    invoice_status = %credited.status,
                    receipt_number = %receipt.receipt_number,
                    "payment settled"
                );
                Ok(SettleOutcome::Settled {
                    receipt,
                    order: stored,
                    invoice: credited,
                })
            }
            Err(err) if err.is_conflict() => {
                tracing::warn!(
                    gateway_order_id = %order.gateway_order_id,
                    "settlement lost a version race, returning recorded outcome"
                );
                let current = self.store.find_order(order.id).await?;
                self.recorded_outcome(current, payment_id).await
            }
            Err(err) => {
                tracing::error!(
                    gateway_order_id = %order.gateway_order_id,
                    error = %err,
                    "settlement commit failed"
                );
                Err(PaymentError::Persistence(err))
            }
        }
    }

    /// Keeps the order open on a non-captured status; a gateway decline also
    /// gets a `FAILED` ledger record, written once per gateway payment
    async fn record_gateway_status(
        &self,
        order: PaymentOrder,
        details: &GatewayPaymentDetails,
        signature: Option<&str>,
    ) -> PaymentResult<SettleOutcome> {
        let status = details.status;
        tracing::info!(
            gateway_order_id = %order.gateway_order_id,
            payment_id = %details.id,
            gateway_status = status.as_str(),
            "payment not captured"
        );
        let mut updated = order.clone();
        updated.gateway_status = Some(status.as_str().to_string());
        updated.record_signature(signature, true);
        updated.updated_at = Utc::now();

        let declined = status == GatewayPaymentStatus::Failed && !self.decline_recorded(&order, &details.id).await?;
        let written = if declined {
            let mut audit = Payment::failed(
                order.invoice_id,
                order.id,
                order.amount,
                Some(details.id.clone()),
                decline_reason(details),
            );
            audit.method = PaymentMethod::from_gateway(&details.method);
            self.store.commit_failure(&updated, &audit).await.map(|stored| {
                self.metrics.increment(metrics::PAYMENTS_FAILED);
                tracing::warn!(
                    gateway_order_id = %stored.gateway_order_id,
                    payment_id = %details.id,
                    error_code = details.error_code.as_deref().unwrap_or("-"),
                    "gateway declined payment"
                );
                stored
            })
        } else {
            self.store.update_order(&updated).await
        };

        let stored = match written {
            Ok(stored) => stored,
            Err(err) if err.is_conflict() => self.store.find_order(order.id).await?,
            Err(err) => return Err(err.into()),
        };
        Ok(SettleOutcome::NotCaptured { status, order: stored })
    }

    async fn decline_recorded(&self, order: &PaymentOrder, payment_id: &GatewayPaymentId) -> PaymentResult<bool> {
        let payments = self.store.list_payments(&PaymentQuery::for_invoice(order.invoice_id)).await?;
        Ok(payments.iter().any(|p| {
            p.order_id == order.id
                && p.status == PaymentStatus::Failed
                && p.transaction_id.as_ref() == Some(payment_id)
        }))
    }

    /// Outcome for an order that already left `CREATED`
    async fn recorded_outcome(&self, order: PaymentOrder, payment_id: &GatewayPaymentId) -> PaymentResult<SettleOutcome> {
        match order.status {
            OrderStatus::Paid | OrderStatus::Refunded | OrderStatus::PartiallyRefunded => {
                if order.gateway_payment_id.as_ref() != Some(payment_id) {
                    tracing::warn!(
                        gateway_order_id = %order.gateway_order_id,
                        payment_id = %payment_id,
                        "callback for a different payment on a settled order"
                    );
                }
                let receipt = self.store.find_receipt(order.id).await?.ok_or_else(|| {
                    PaymentError::invalid_state(format!(
                        "order {} is {} but has no receipt",
                        order.gateway_order_id, order.status
                    ))
                })?;
                tracing::warn!(
                    gateway_order_id = %order.gateway_order_id,
                    "duplicate success delivery, returning stored receipt"
                );
                Ok(SettleOutcome::Duplicate { receipt })
            }
            OrderStatus::Created => Err(PaymentError::Conflict(format!(
                "order {} changed concurrently",
                order.gateway_order_id
            ))),
            OrderStatus::Failed | OrderStatus::Expired => Err(PaymentError::invalid_state(format!(
                "order {} is {}",
                order.gateway_order_id, order.status
            ))),
        }
    }

    // ========================================================================
    // Failure, expiry, retry
    // ========================================================================

    /// Records a checkout failure for a `CREATED` order
    pub async fn mark_failed(
        &self,
        gateway_order_id: &GatewayOrderId,
        report: &FailureReport,
        payment_id: Option<&GatewayPaymentId>,
    ) -> PaymentResult<FailureOutcome> {
        let order = self.load_order(gateway_order_id).await?;
        if order.status.is_terminal_for_payment() {
            tracing::debug!(
                gateway_order_id = %gateway_order_id,
                status = %order.status,
                "failure report for a finished order ignored"
            );
            return Ok(FailureOutcome::AlreadyFinal(order));
        }

        let summary = report.summary();
        let mut failed = order.clone();
        failed.mark_failed(report.error_code.clone(), summary.clone())?;
        let audit = Payment::failed(order.invoice_id, order.id, order.amount, payment_id.cloned(), summary);

        match self.store.commit_failure(&failed, &audit).await {
            Ok(stored) => {
                self.metrics.increment(metrics::PAYMENTS_FAILED);
                tracing::info!(
                    gateway_order_id = %gateway_order_id,
                    error_code = %report.error_code,
                    "payment order failed"
                );
                Ok(FailureOutcome::Recorded(stored))
            }
            Err(err) if err.is_conflict() => {
                let current = self.store.find_order(order.id).await?;
                Ok(FailureOutcome::AlreadyFinal(current))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Expires every `CREATED` order whose expiry is before `now`
    pub async fn expire(&self, now: DateTime<Utc>) -> PaymentResult<Vec<PaymentOrder>> {
        let candidates = self.store.list_expired_orders(now).await?;
        let mut expired = Vec::with_capacity(candidates.len());
        for order in candidates {
            if let Some(stored) = self.expire_order(order).await? {
                expired.push(stored);
            }
        }
        Ok(expired)
    }

    /// Version-checked move to `EXPIRED`; `None` if another writer got there first
    async fn expire_order(&self, order: PaymentOrder) -> PaymentResult<Option<PaymentOrder>> {
        let mut updated = order.clone();
        updated.transition_to(OrderStatus::Expired)?;
        match self.store.update_order(&updated).await {
            Ok(stored) => {
                self.metrics.increment(metrics::ORDERS_EXPIRED);
                tracing::info!(
                    gateway_order_id = %stored.gateway_order_id,
                    invoice_id = %stored.invoice_id,
                    expires_at = %stored.expires_at,
                    "payment order expired"
                );
                Ok(Some(stored))
            }
            Err(err) if err.is_conflict() => {
                tracing::debug!(gateway_order_id = %order.gateway_order_id, "order changed before expiry");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Expires the invoice's open order and initiates a fresh one for the full balance
    pub async fn retry(&self, invoice_id: InvoiceId, customer: Option<&CustomerContact>) -> PaymentResult<Initiation> {
        if let Some(open) = self.store.find_created_order(invoice_id).await? {
            tracing::info!(
                invoice_id = %invoice_id,
                gateway_order_id = %open.gateway_order_id,
                "retry requested, expiring open order"
            );
            if self.expire_order(open.clone()).await?.is_none() {
                let current = self.store.find_order(open.id).await?;
                if !current.status.is_terminal_for_payment() {
                    return Err(PaymentError::Conflict(format!(
                        "order {} changed during retry",
                        open.gateway_order_id
                    )));
                }
            }
        }
        self.initiate(invoice_id, None, customer).await
    }

    // ========================================================================
    // Refunds
    // ========================================================================

    /// Refunds part or all of a settled payment
    pub async fn refund(
        &self,
        payment_id: &GatewayPaymentId,
        amount: Option<Money>,
        speed: RefundSpeed,
    ) -> PaymentResult<RefundOutcome> {
        let order = self.store.find_order_by_payment_id(payment_id).await.map_err(|err| {
            if err.is_not_found() {
                PaymentError::PaymentNotFound(payment_id.to_string())
            } else {
                PaymentError::Persistence(err)
            }
        })?;
        if !order.status.is_refundable() {
            return Err(PaymentError::invalid_state(format!(
                "order {} is {} and cannot be refunded",
                order.gateway_order_id, order.status
            )));
        }

        let refundable = order.refundable_amount()?;
        let refund_amount = amount.unwrap_or(refundable);
        if refund_amount.currency() != refundable.currency() {
            return Err(PaymentError::validation("refund currency does not match payment currency"));
        }
        if !refund_amount.is_positive() {
            return Err(PaymentError::validation("refund amount must be greater than zero"));
        }
        if refund_amount > refundable {
            return Err(PaymentError::validation(format!(
                "refund {} exceeds refundable balance {}",
                refund_amount, refundable
            )));
        }

        let gateway_refund = self.gateway.refund(payment_id, refund_amount, speed).await?;
        let record = RefundRecord {
            id: RefundRecordId::new(),
            order_id: order.id,
            invoice_id: order.invoice_id,
            gateway_refund_id: gateway_refund.id.clone(),
            gateway_payment_id: payment_id.clone(),
            amount: refund_amount,
            speed,
            status: gateway_refund.status.clone(),
            created_at: Utc::now(),
        };

        let mut current = order;
        for attempt in 1..=REFUND_BOOKING_ATTEMPTS {
            let mut updated = current.clone();
            updated.apply_refund(refund_amount)?;
            match self.store.commit_refund(&updated, &record).await {
                Ok(stored) => {
                    tracing::info!(
                        gateway_order_id = %stored.gateway_order_id,
                        refund_id = %record.gateway_refund_id,
                        amount = refund_amount.minor_units(),
                        status = %stored.status,
                        "refund booked"
                    );
                    return Ok(RefundOutcome { refund: record, order: stored });
                }
                Err(err) if err.is_conflict() && attempt < REFUND_BOOKING_ATTEMPTS => {
                    tracing::warn!(
                        gateway_order_id = %current.gateway_order_id,
                        attempt,
                        "refund booking raced another write, retrying"
                    );
                    current = self.store.find_order(current.id).await?;
                }
                Err(err) => {
                    tracing::error!(
                        gateway_order_id = %current.gateway_order_id,
                        refund_id = %record.gateway_refund_id,
                        error = %err,
                        "gateway refund issued but not booked locally"
                    );
                    return Err(err.into());
                }
            }
        }
        Err(PaymentError::Conflict(format!(
            "refund {} could not be booked",
            record.gateway_refund_id
        )))
    }
}

fn decline_reason(details: &GatewayPaymentDetails) -> String {
    let code = details.error_code.as_deref().unwrap_or("GATEWAY_DECLINED");
    match details.error_description.as_deref() {
        Some(description) => format!("{}: {}", code, description),
        None => code.to_string(),
    }
}
