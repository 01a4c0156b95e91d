//! End-to-end tests for the payment service against in-memory collaborators

use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;

use core_kernel::metrics;
use core_kernel::{GatewayOrderId, GatewayPaymentId, InvoiceId, PortError};

use domain_payments::gateway::GatewayPaymentStatus;
use domain_payments::mock::captured_payment;
use domain_payments::order::SIGNATURE_INVALID;
use domain_payments::{
    FailureReport, InvoiceStatus, OrderStatus, PaymentError, PaymentEvent, PaymentMethod, PaymentQuery,
    PaymentStatus, PaymentStore, RefundSpeed, SweeperConfig, WebhookOutcome,
};

use test_utils::{
    assert_invoice_balance, assert_order_status, assert_receipt, payment_webhook, GatewayFixtures, IdFixtures,
    InvoiceBuilder, MoneyFixtures, PaymentHarness, PaymentOrderBuilder,
};

fn inr(paise: i64) -> core_kernel::Money {
    MoneyFixtures::inr(paise)
}

async fn seeded() -> (PaymentHarness, InvoiceId) {
    let harness = PaymentHarness::new();
    let invoice_id = harness.seed_invoice(InvoiceBuilder::new().build()).await;
    (harness, invoice_id)
}

// ============================================================================
// Initiation Tests
// ============================================================================

mod initiation_tests {
    use super::*;

    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::DateTime;
    use core_kernel::metrics::InMemoryMetrics;
    use core_kernel::{DomainPort, PaymentOrderId};
    use domain_payments::mock::MockGateway;
    use domain_payments::store::{InsertOutcome, Settlement};
    use domain_payments::{
        InMemoryPaymentStore, InvoiceLedger, InvoiceReconciler, LogNotifier, Payment, PaymentMethodDetails,
        PaymentOrder, PaymentPorts, PaymentService, Receipt, RefundRecord,
    };
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn test_full_balance_order() {
        let (h, invoice_id) = seeded().await;

        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();

        assert_eq!(session.amount_to_pay, inr(500_000));
        assert!(!session.is_partial);
        assert!(!session.reused);
        assert_eq!(session.key_id, GatewayFixtures::KEY_ID);
        assert!(session.expires_at > Utc::now() + Duration::minutes(29));
        assert_eq!(h.gateway.create_calls(), 1);
        assert_eq!(h.metrics.count(metrics::PAYMENT_ORDERS_CREATED), 1);
    }

    #[tokio::test]
    async fn test_initiation_is_idempotent() {
        let (h, invoice_id) = seeded().await;

        let first = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        let second = h.service.initiate_payment(invoice_id, None, None).await.unwrap();

        assert_eq!(first.gateway_order_id, second.gateway_order_id);
        assert!(second.reused);
        assert_eq!(h.gateway.create_calls(), 1);
        assert_eq!(h.orders(invoice_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_customer_contact_defaults_to_invoice() {
        let (h, invoice_id) = seeded().await;
        h.service.initiate_payment(invoice_id, None, None).await.unwrap();

        let request = h.gateway.last_create_request().await.unwrap();
        assert_eq!(
            request.notes.get("customer_email").map(String::as_str),
            Some("accounts@northwind-fleet.example")
        );
        assert_eq!(request.notes.get("invoice_number").map(String::as_str), Some("INV-2024-000123"));
        assert!(request.receipt.len() <= 40);
    }

    #[tokio::test]
    async fn test_amount_at_remaining_accepted_and_above_rejected() {
        let h = PaymentHarness::new();
        let invoice_id = h
            .seed_invoice(InvoiceBuilder::new().with_paid(inr(200_000)).build())
            .await;

        let err = h
            .service
            .initiate_payment(invoice_id, Some(inr(300_001)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
        assert_eq!(h.gateway.create_calls(), 0);

        let session = h
            .service
            .initiate_payment(invoice_id, Some(inr(300_000)), None)
            .await
            .unwrap();
        assert_eq!(session.amount_to_pay, inr(300_000));
        assert!(!session.is_partial);
    }

    #[tokio::test]
    async fn test_zero_and_foreign_currency_amounts_rejected() {
        let (h, invoice_id) = seeded().await;

        let zero = h.service.initiate_payment(invoice_id, Some(inr(0)), None).await;
        assert!(matches!(zero, Err(PaymentError::Validation(_))));

        let usd = h
            .service
            .initiate_payment(invoice_id, Some(MoneyFixtures::usd(1_000)), None)
            .await;
        assert!(matches!(usd, Err(PaymentError::Validation(_))));
        assert_eq!(h.gateway.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_unpayable_invoices_rejected() {
        let h = PaymentHarness::new();
        for status in [InvoiceStatus::Paid, InvoiceStatus::Cancelled, InvoiceStatus::Draft] {
            let invoice_id = h
                .seed_invoice(InvoiceBuilder::new().with_status(status).build())
                .await;
            let err = h.service.initiate_payment(invoice_id, None, None).await.unwrap_err();
            assert!(matches!(err, PaymentError::InvalidState(_)), "{status} should be rejected");
        }
        assert_eq!(h.gateway.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_invoice_is_not_found() {
        let h = PaymentHarness::new();
        let err = h.service.initiate_payment(InvoiceId::new(), None, None).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvoiceNotFound(_)));
    }

    #[tokio::test]
    async fn test_gateway_outage_leaves_no_order() {
        let (h, invoice_id) = seeded().await;
        for _ in 0..3 {
            h.gateway.fail_next_create(PortError::connection("connection reset")).await;
        }

        let err = h.service.initiate_payment(invoice_id, None, None).await.unwrap_err();

        assert!(matches!(err, PaymentError::GatewayUnavailable { attempts: 3, .. }));
        assert_eq!(h.gateway.create_calls(), 3);
        assert!(h.orders(invoice_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_gateway_fails_fast() {
        let h = PaymentHarness::with_config(GatewayFixtures::disabled_config());
        let invoice_id = h.seed_invoice(InvoiceBuilder::new().build()).await;

        let err = h.service.initiate_payment(invoice_id, None, None).await.unwrap_err();
        assert!(matches!(err, PaymentError::Configuration(_)));
        assert_eq!(h.gateway.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_open_order_is_replaced() {
        let (h, invoice_id) = seeded().await;
        let stale = PaymentOrderBuilder::new()
            .for_invoice(invoice_id)
            .with_gateway_id("order_stale")
            .expired()
            .build();
        h.store.insert_order(stale).await.unwrap();

        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();

        assert_ne!(session.gateway_order_id, GatewayOrderId::new("order_stale"));
        assert!(!session.reused);
        let orders = h.orders(invoice_id).await;
        let old = orders
            .iter()
            .find(|o| o.gateway_order_id.as_str() == "order_stale")
            .unwrap();
        assert_order_status(old, OrderStatus::Expired);
    }

    /// Commits a queued settlement right after the open order is read, the way
    /// a late success callback interleaves with a new initiation
    struct SettleAfterRead {
        inner: Arc<InMemoryPaymentStore>,
        pending: Mutex<Option<Settlement>>,
    }

    impl DomainPort for SettleAfterRead {}

    #[async_trait]
    impl PaymentStore for SettleAfterRead {
        async fn insert_order(&self, order: PaymentOrder) -> Result<InsertOutcome, PortError> {
            self.inner.insert_order(order).await
        }

        async fn find_order(&self, id: PaymentOrderId) -> Result<PaymentOrder, PortError> {
            self.inner.find_order(id).await
        }

        async fn find_order_by_gateway_id(&self, id: &GatewayOrderId) -> Result<PaymentOrder, PortError> {
            self.inner.find_order_by_gateway_id(id).await
        }

        async fn find_order_by_payment_id(&self, id: &GatewayPaymentId) -> Result<PaymentOrder, PortError> {
            self.inner.find_order_by_payment_id(id).await
        }

        async fn find_created_order(&self, invoice_id: InvoiceId) -> Result<Option<PaymentOrder>, PortError> {
            let found = self.inner.find_created_order(invoice_id).await?;
            if let Some(settlement) = self.pending.lock().await.take() {
                self.inner.commit_settlement(&settlement).await?;
            }
            Ok(found)
        }

        async fn update_order(&self, order: &PaymentOrder) -> Result<PaymentOrder, PortError> {
            self.inner.update_order(order).await
        }

        async fn commit_settlement(&self, settlement: &Settlement) -> Result<PaymentOrder, PortError> {
            self.inner.commit_settlement(settlement).await
        }

        async fn commit_failure(&self, order: &PaymentOrder, payment: &Payment) -> Result<PaymentOrder, PortError> {
            self.inner.commit_failure(order, payment).await
        }

        async fn commit_refund(&self, order: &PaymentOrder, refund: &RefundRecord) -> Result<PaymentOrder, PortError> {
            self.inner.commit_refund(order, refund).await
        }

        async fn list_expired_orders(&self, now: DateTime<Utc>) -> Result<Vec<PaymentOrder>, PortError> {
            self.inner.list_expired_orders(now).await
        }

        async fn list_payments(&self, query: &PaymentQuery) -> Result<Vec<Payment>, PortError> {
            self.inner.list_payments(query).await
        }

        async fn list_refunds(&self, query: &PaymentQuery) -> Result<Vec<RefundRecord>, PortError> {
            self.inner.list_refunds(query).await
        }

        async fn find_receipt(&self, order_id: PaymentOrderId) -> Result<Option<Receipt>, PortError> {
            self.inner.find_receipt(order_id).await
        }
    }

    #[tokio::test]
    async fn test_stale_order_settled_during_initiation_is_not_replaced() {
        let inner = Arc::new(InMemoryPaymentStore::new());
        let invoice = InvoiceBuilder::new().build();
        let invoice_id = invoice.id;
        inner.seed_invoice(invoice.clone()).await;

        let stale = PaymentOrderBuilder::new()
            .for_invoice(invoice_id)
            .with_gateway_id("order_late")
            .with_amount(inr(500_000))
            .expired()
            .build();
        let stored = match inner.insert_order(stale).await.unwrap() {
            InsertOutcome::Inserted(order) => order,
            other => panic!("unexpected insert outcome: {other:?}"),
        };

        let payment_id = IdFixtures::new_payment_id();
        let credited = InvoiceReconciler::apply_payment(&invoice, inr(500_000)).unwrap();
        let mut paid = stored.clone();
        paid.mark_paid(
            payment_id.clone(),
            inr(500_000),
            PaymentMethodDetails {
                method: PaymentMethod::Upi,
                bank: None,
                wallet: None,
                vpa: None,
                fee: None,
                tax: None,
            },
        )
        .unwrap();
        let payment = Payment::completed(invoice_id, stored.id, inr(500_000), PaymentMethod::Upi, payment_id);
        let receipt = InvoiceReconciler::receipt(&invoice, &credited, &paid, &payment).unwrap();

        let store = Arc::new(SettleAfterRead {
            inner: inner.clone(),
            pending: Mutex::new(Some(Settlement {
                order: paid,
                payment,
                invoice: credited,
                receipt,
            })),
        });
        let gateway = Arc::new(MockGateway::new());
        let service = PaymentService::new(PaymentPorts {
            ledger: inner.clone(),
            store,
            gateway: gateway.clone(),
            notifier: Arc::new(LogNotifier),
            metrics: Arc::new(InMemoryMetrics::new()),
            config: Arc::new(GatewayFixtures::config()),
        });

        let err = service.initiate_payment(invoice_id, None, None).await.unwrap_err();

        assert!(matches!(err, PaymentError::InvalidState(_)), "got {err:?}");
        assert_eq!(gateway.create_calls(), 0);
        let orders = inner.orders_for_invoice(invoice_id).await;
        assert_eq!(orders.len(), 1);
        assert_order_status(&orders[0], OrderStatus::Paid);
        let ledger = inner.find_invoice(invoice_id).await.unwrap();
        assert_invoice_balance(&ledger, 500_000, InvoiceStatus::Paid);
    }
}

// ============================================================================
// Settlement Tests
// ============================================================================

mod settlement_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_payment_end_to_end() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();

        let (payment_id, receipt) = h.pay(&session.gateway_order_id, inr(500_000)).await.unwrap();

        assert_receipt(&receipt, 500_000, 0, true);
        assert_eq!(receipt.previously_paid, inr(0));
        assert_eq!(receipt.method, PaymentMethod::Upi);
        assert_invoice_balance(&h.invoice(invoice_id).await, 500_000, InvoiceStatus::Paid);
        assert!(h.invoice(invoice_id).await.paid_at.is_some());

        let order = h.orders(invoice_id).await.remove(0);
        assert_order_status(&order, OrderStatus::Paid);
        assert_eq!(order.gateway_payment_id, Some(payment_id));
        assert!(order.signature_verified);
        let details = order.method_details.unwrap();
        assert_eq!(details.vpa.as_deref(), Some("fleet@okaxis"));
        assert_eq!(details.fee, Some(inr(10_000)));
        assert_eq!(h.metrics.count(metrics::PAYMENTS_SUCCEEDED), 1);
    }

    #[tokio::test]
    async fn test_partial_payment_then_balance() {
        let (h, invoice_id) = seeded().await;

        let first = h
            .service
            .initiate_payment(invoice_id, Some(inr(200_000)), None)
            .await
            .unwrap();
        assert!(first.is_partial);
        let (_, receipt) = h.pay(&first.gateway_order_id, inr(200_000)).await.unwrap();
        assert_receipt(&receipt, 200_000, 300_000, false);
        assert_invoice_balance(&h.invoice(invoice_id).await, 200_000, InvoiceStatus::PartiallyPaid);

        let second = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        assert_ne!(second.gateway_order_id, first.gateway_order_id);
        assert_eq!(second.amount_to_pay, inr(300_000));
        let (_, receipt) = h.pay(&second.gateway_order_id, inr(300_000)).await.unwrap();

        assert_receipt(&receipt, 300_000, 0, true);
        assert_eq!(receipt.previously_paid, inr(200_000));
        assert_invoice_balance(&h.invoice(invoice_id).await, 500_000, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn test_duplicate_success_returns_same_receipt() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        let (payment_id, first) = h.pay(&session.gateway_order_id, inr(500_000)).await.unwrap();

        let signature = h.callback_signature(&session.gateway_order_id, &payment_id);
        let again = h
            .service
            .handle_payment_success(&session.gateway_order_id, &payment_id, &signature)
            .await
            .unwrap();

        assert_eq!(again.receipt_number, first.receipt_number);
        assert_invoice_balance(&h.invoice(invoice_id).await, 500_000, InvoiceStatus::Paid);
        assert_eq!(h.metrics.count(metrics::PAYMENTS_SUCCEEDED), 1);
        assert_eq!(
            h.service.get_payment_history(invoice_id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_callbacks_credit_once() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, Some(inr(200_000)), None).await.unwrap();
        let order_id = session.gateway_order_id.clone();
        let payment_id = IdFixtures::new_payment_id();
        h.gateway.capture(&order_id, &payment_id, inr(200_000)).await;
        let signature = h.callback_signature(&order_id, &payment_id);

        let (a, b) = tokio::join!(
            h.service.handle_payment_success(&order_id, &payment_id, &signature),
            h.service.handle_payment_success(&order_id, &payment_id, &signature),
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.receipt_number, b.receipt_number);
        assert_invoice_balance(&h.invoice(invoice_id).await, 200_000, InvoiceStatus::PartiallyPaid);
        assert_eq!(h.metrics.count(metrics::PAYMENTS_SUCCEEDED), 1);
    }

    #[tokio::test]
    async fn test_invalid_signature_fails_order_without_credit() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        let payment_id = IdFixtures::new_payment_id();
        h.gateway
            .capture(&session.gateway_order_id, &payment_id, inr(500_000))
            .await;

        let err = h
            .service
            .handle_payment_success(&session.gateway_order_id, &payment_id, "deadbeef")
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::SignatureInvalid { .. }));
        assert_eq!(h.gateway.fetch_calls(), 0);
        let order = h.orders(invoice_id).await.remove(0);
        assert_order_status(&order, OrderStatus::Failed);
        assert_eq!(order.failure_code.as_deref(), Some(SIGNATURE_INVALID));
        assert_invoice_balance(&h.invoice(invoice_id).await, 0, InvoiceStatus::Pending);

        let history = h.service.get_payment_history(invoice_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_valid_signature_after_rejection_is_refused() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        let payment_id = IdFixtures::new_payment_id();
        h.gateway
            .capture(&session.gateway_order_id, &payment_id, inr(500_000))
            .await;
        h.service
            .handle_payment_success(&session.gateway_order_id, &payment_id, "00ff")
            .await
            .unwrap_err();

        let signature = h.callback_signature(&session.gateway_order_id, &payment_id);
        let err = h
            .service
            .handle_payment_success(&session.gateway_order_id, &payment_id, &signature)
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::InvalidState(_)));
        assert_invoice_balance(&h.invoice(invoice_id).await, 0, InvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn test_uncaptured_payment_leaves_order_open() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        let payment_id = IdFixtures::new_payment_id();
        let mut details = captured_payment(&session.gateway_order_id, &payment_id, inr(500_000));
        details.status = GatewayPaymentStatus::Authorized;
        h.gateway.set_payment(details).await;

        let signature = h.callback_signature(&session.gateway_order_id, &payment_id);
        let err = h
            .service
            .handle_payment_success(&session.gateway_order_id, &payment_id, &signature)
            .await
            .unwrap_err();

        match err {
            PaymentError::PaymentNotCaptured { status } => assert_eq!(status, "authorized"),
            other => panic!("expected not-captured, got {other:?}"),
        }
        let order = h.orders(invoice_id).await.remove(0);
        assert_order_status(&order, OrderStatus::Created);
        assert_eq!(order.gateway_status.as_deref(), Some("authorized"));
        assert_invoice_balance(&h.invoice(invoice_id).await, 0, InvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn test_gateway_decline_is_recorded_once() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        let payment_id = IdFixtures::new_payment_id();
        let mut details = captured_payment(&session.gateway_order_id, &payment_id, inr(500_000));
        details.status = GatewayPaymentStatus::Failed;
        details.error_code = Some("BAD_REQUEST_ERROR".to_string());
        details.error_description = Some("Payment declined by bank".to_string());
        h.gateway.set_payment(details).await;
        let signature = h.callback_signature(&session.gateway_order_id, &payment_id);

        for _ in 0..2 {
            let err = h
                .service
                .handle_payment_success(&session.gateway_order_id, &payment_id, &signature)
                .await
                .unwrap_err();
            match err {
                PaymentError::PaymentNotCaptured { status } => assert_eq!(status, "failed"),
                other => panic!("expected not-captured, got {other:?}"),
            }
        }

        let order = h.orders(invoice_id).await.remove(0);
        assert_order_status(&order, OrderStatus::Created);
        assert_eq!(order.gateway_status.as_deref(), Some("failed"));

        let history = h.service.get_payment_history(invoice_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, PaymentStatus::Failed);
        assert_eq!(history[0].transaction_id.as_ref(), Some(&payment_id));
        assert_eq!(history[0].method, PaymentMethod::Upi);
        assert_eq!(
            history[0].failure_reason.as_deref(),
            Some("BAD_REQUEST_ERROR: Payment declined by bank")
        );
        assert_eq!(h.metrics.count(metrics::PAYMENTS_FAILED), 1);
        assert_invoice_balance(&h.invoice(invoice_id).await, 0, InvoiceStatus::Pending);

        // The customer may still pay the open order with another method
        let (_, receipt) = h.pay(&session.gateway_order_id, inr(500_000)).await.unwrap();
        assert!(receipt.is_fully_paid);
    }

    #[tokio::test]
    async fn test_overcapture_is_not_credited() {
        let (h, invoice_id) = seeded().await;
        let session = h
            .service
            .initiate_payment(invoice_id, Some(inr(100_000)), None)
            .await
            .unwrap();

        let err = h.pay(&session.gateway_order_id, inr(100_001)).await.unwrap_err();

        assert!(matches!(err, PaymentError::Validation(_)));
        assert_order_status(&h.orders(invoice_id).await.remove(0), OrderStatus::Created);
        assert_invoice_balance(&h.invoice(invoice_id).await, 0, InvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let h = PaymentHarness::new();
        let order_id = GatewayOrderId::new("order_missing");
        let payment_id = GatewayPaymentId::new("pay_missing");
        let signature = h.callback_signature(&order_id, &payment_id);

        let err = h
            .service
            .handle_payment_success(&order_id, &payment_id, &signature)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::OrderNotFound(_)));
    }
}

// ============================================================================
// Failure, Retry and Expiry Tests
// ============================================================================

mod lifecycle_tests {
    use super::*;

    fn declined() -> FailureReport {
        FailureReport {
            error_code: "BAD_REQUEST_ERROR".to_string(),
            error_description: "Payment declined by bank".to_string(),
            error_reason: Some("payment_declined".to_string()),
        }
    }

    #[tokio::test]
    async fn test_failure_callback_records_audit_payment() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();

        let order = h
            .service
            .handle_payment_failure(&session.gateway_order_id, &declined(), None)
            .await
            .unwrap();

        assert_order_status(&order, OrderStatus::Failed);
        assert_eq!(order.failure_code.as_deref(), Some("BAD_REQUEST_ERROR"));
        let history = h.service.get_payment_history(invoice_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, PaymentStatus::Failed);
        assert!(history[0].failure_reason.as_deref().unwrap().contains("declined"));
        assert_eq!(h.metrics.count(metrics::PAYMENTS_FAILED), 1);
    }

    #[tokio::test]
    async fn test_failure_after_settlement_is_ignored() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        h.pay(&session.gateway_order_id, inr(500_000)).await.unwrap();

        let order = h
            .service
            .handle_payment_failure(&session.gateway_order_id, &declined(), None)
            .await
            .unwrap();

        assert_order_status(&order, OrderStatus::Paid);
        assert_eq!(h.metrics.count(metrics::PAYMENTS_FAILED), 0);
    }

    #[tokio::test]
    async fn test_retry_replaces_open_order() {
        let (h, invoice_id) = seeded().await;
        let first = h.service.initiate_payment(invoice_id, None, None).await.unwrap();

        let retried = h.service.retry_payment(invoice_id, None).await.unwrap();

        assert_ne!(retried.gateway_order_id, first.gateway_order_id);
        assert_eq!(retried.amount_to_pay, inr(500_000));
        assert_eq!(h.gateway.create_calls(), 2);
        let orders = h.orders(invoice_id).await;
        assert_order_status(&orders[0], OrderStatus::Expired);
        assert_order_status(&orders[1], OrderStatus::Created);
    }

    #[tokio::test]
    async fn test_sweep_expires_past_due_orders_only() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();

        let nothing = h.service.expire_stale_orders(Utc::now()).await.unwrap();
        assert!(nothing.is_empty());

        let sweeper = h.service.sweeper(SweeperConfig::default());
        let expired = sweeper.run_once(session.expires_at + Duration::seconds(1)).await.unwrap();

        assert_eq!(expired.len(), 1);
        assert_order_status(&expired[0], OrderStatus::Expired);
        assert_eq!(h.metrics.count(metrics::ORDERS_EXPIRED), 1);
        assert_invoice_balance(&h.invoice(invoice_id).await, 0, InvoiceStatus::Pending);

        let err = h.pay(&session.gateway_order_id, inr(500_000)).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidState(_)));
        assert_order_status(&h.orders(invoice_id).await.remove(0), OrderStatus::Expired);
    }

    fn expired_order(invoice_id: InvoiceId, gateway_id: &str) -> domain_payments::PaymentOrder {
        PaymentOrderBuilder::new()
            .for_invoice(invoice_id)
            .with_gateway_id(gateway_id)
            .expired()
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_runs_each_interval_until_shutdown() {
        let (h, invoice_id) = seeded().await;
        h.store.insert_order(expired_order(invoice_id, "order_first")).await.unwrap();

        let (shutdown, rx) = tokio::sync::watch::channel(false);
        let config = SweeperConfig {
            enabled: true,
            interval_secs: 60,
        };
        let handle = h.service.sweeper(config).spawn(rx);

        tokio::time::sleep(StdDuration::from_secs(61)).await;
        let orders = h.orders(invoice_id).await;
        assert_order_status(&orders[0], OrderStatus::Expired);

        h.store.insert_order(expired_order(invoice_id, "order_second")).await.unwrap();
        tokio::time::sleep(StdDuration::from_secs(61)).await;
        let orders = h.orders(invoice_id).await;
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|o| o.status == OrderStatus::Expired));
        assert_eq!(h.metrics.count(metrics::ORDERS_EXPIRED), 2);

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_sweeper_exits_without_sweeping() {
        let (h, invoice_id) = seeded().await;
        h.store.insert_order(expired_order(invoice_id, "order_idle")).await.unwrap();

        let (_shutdown, rx) = tokio::sync::watch::channel(false);
        let config = SweeperConfig {
            enabled: false,
            interval_secs: 60,
        };
        h.service.sweeper(config).spawn(rx).await.unwrap();

        assert_order_status(&h.orders(invoice_id).await[0], OrderStatus::Created);
        assert_eq!(h.metrics.count(metrics::ORDERS_EXPIRED), 0);
    }

    #[tokio::test]
    async fn test_status_view_tracks_pending_order() {
        let (h, invoice_id) = seeded().await;

        let before = h.service.get_payment_status(invoice_id).await.unwrap();
        assert!(!before.has_pending_order);
        assert_eq!(before.remaining_amount, inr(500_000));

        h.service
            .initiate_payment(invoice_id, Some(inr(200_000)), None)
            .await
            .unwrap();
        let during = h.service.get_payment_status(invoice_id).await.unwrap();
        assert!(during.has_pending_order);
        assert_eq!(during.invoice_status, InvoiceStatus::Pending);
    }
}

// ============================================================================
// Refund Tests
// ============================================================================

mod refund_tests {
    use super::*;

    #[tokio::test]
    async fn test_partial_then_remaining_refund() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        let (payment_id, _) = h.pay(&session.gateway_order_id, inr(500_000)).await.unwrap();

        let partial = h
            .service
            .refund(&payment_id, Some(inr(100_000)), RefundSpeed::Normal)
            .await
            .unwrap();
        assert_order_status(&partial.order, OrderStatus::PartiallyRefunded);
        assert_eq!(partial.refund.amount, inr(100_000));
        assert_eq!(partial.refund.status, "processed");

        let rest = h.service.refund(&payment_id, None, RefundSpeed::Optimum).await.unwrap();
        assert_order_status(&rest.order, OrderStatus::Refunded);
        assert_eq!(rest.refund.amount, inr(400_000));
        assert_eq!(h.gateway.refund_requests().await[1].speed, RefundSpeed::Optimum);

        // invoice status is not rolled back by refunds
        assert_invoice_balance(&h.invoice(invoice_id).await, 500_000, InvoiceStatus::Paid);
        assert_eq!(h.metrics.count(metrics::REFUNDS_PROCESSED), 2);
    }

    #[tokio::test]
    async fn test_refund_above_refundable_rejected_before_gateway() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        let (payment_id, _) = h.pay(&session.gateway_order_id, inr(500_000)).await.unwrap();

        let err = h
            .service
            .refund(&payment_id, Some(inr(500_001)), RefundSpeed::Normal)
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Validation(_)));
        assert_eq!(h.gateway.refund_calls(), 0);
    }

    #[tokio::test]
    async fn test_fully_refunded_order_cannot_refund_again() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        let (payment_id, _) = h.pay(&session.gateway_order_id, inr(500_000)).await.unwrap();
        h.service.refund(&payment_id, None, RefundSpeed::Normal).await.unwrap();

        let err = h
            .service
            .refund(&payment_id, Some(inr(1)), RefundSpeed::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_refund_for_unknown_payment() {
        let h = PaymentHarness::new();
        let err = h
            .service
            .refund(&GatewayPaymentId::new("pay_unknown"), None, RefundSpeed::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::PaymentNotFound(_)));
    }

    #[tokio::test]
    async fn test_stats_include_refunds() {
        let (h, invoice_id) = seeded().await;
        let session = h
            .service
            .initiate_payment(invoice_id, Some(inr(200_000)), None)
            .await
            .unwrap();
        let (payment_id, _) = h.pay(&session.gateway_order_id, inr(200_000)).await.unwrap();
        h.service
            .refund(&payment_id, Some(inr(50_000)), RefundSpeed::Normal)
            .await
            .unwrap();

        let stats = h.service.payment_stats(PaymentQuery::default()).await.unwrap();

        assert_eq!(stats.completed_count, 1);
        assert_eq!(stats.total_collected, inr(200_000));
        assert_eq!(stats.total_refunded, inr(50_000));
        assert_eq!(stats.by_method.get(&PaymentMethod::Upi), Some(&1));
    }
}

// ============================================================================
// Webhook and Notification Tests
// ============================================================================

mod webhook_tests {
    use super::*;

    #[tokio::test]
    async fn test_captured_webhook_settles_then_deduplicates() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        let payment_id = IdFixtures::new_payment_id();
        h.gateway
            .capture(&session.gateway_order_id, &payment_id, inr(500_000))
            .await;
        let (body, signature) =
            h.signed_webhook(&payment_webhook("payment.captured", &session.gateway_order_id, &payment_id));

        let first = h.service.handle_webhook(&body, &signature).await.unwrap();
        let second = h.service.handle_webhook(&body, &signature).await.unwrap();

        let receipt = match first {
            WebhookOutcome::Settled(receipt) => receipt,
            other => panic!("expected settlement, got {other:?}"),
        };
        assert_eq!(second, WebhookOutcome::Duplicate(receipt));
        assert_invoice_balance(&h.invoice(invoice_id).await, 500_000, InvoiceStatus::Paid);

        let order = h.orders(invoice_id).await.remove(0);
        assert!(order.signature_verified);
        assert!(order.signature.is_none());
    }

    #[tokio::test]
    async fn test_failed_webhook_marks_order_failed() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        let (body, signature) = h.signed_webhook(&payment_webhook(
            "payment.failed",
            &session.gateway_order_id,
            &IdFixtures::new_payment_id(),
        ));

        let outcome = h.service.handle_webhook(&body, &signature).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::FailureRecorded);
        assert_order_status(&h.orders(invoice_id).await.remove(0), OrderStatus::Failed);
    }

    #[tokio::test]
    async fn test_tampered_webhook_rejected() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        let (mut body, signature) = h.signed_webhook(&payment_webhook(
            "payment.captured",
            &session.gateway_order_id,
            &IdFixtures::new_payment_id(),
        ));
        body.push(b' ');

        let err = h.service.handle_webhook(&body, &signature).await.unwrap_err();

        assert!(matches!(err, PaymentError::SignatureInvalid { .. }));
        assert_order_status(&h.orders(invoice_id).await.remove(0), OrderStatus::Created);
    }

    #[tokio::test]
    async fn test_unknown_event_and_order_are_acknowledged() {
        let h = PaymentHarness::new();

        let (body, signature) = h.signed_webhook(&serde_json::json!({
            "event": "settlement.processed",
            "payload": {}
        }));
        assert_eq!(
            h.service.handle_webhook(&body, &signature).await.unwrap(),
            WebhookOutcome::Acknowledged
        );

        let (body, signature) = h.signed_webhook(&payment_webhook(
            "payment.captured",
            &GatewayOrderId::new("order_elsewhere"),
            &IdFixtures::new_payment_id(),
        ));
        assert_eq!(
            h.service.handle_webhook(&body, &signature).await.unwrap(),
            WebhookOutcome::Acknowledged
        );
    }

    #[tokio::test]
    async fn test_success_notifies_customer() {
        let (h, invoice_id) = seeded().await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();
        h.pay(&session.gateway_order_id, inr(500_000)).await.unwrap();

        assert!(h.notifier.wait_for_events(1, StdDuration::from_secs(2)).await);
        let events = h.notifier.in_app_events().await;
        assert!(matches!(events[0], PaymentEvent::Succeeded { .. }));
        assert_eq!(events[0].invoice_id(), invoice_id);
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_affect_settlement() {
        let h = PaymentHarness::with_failing_notifier();
        let invoice_id = h.seed_invoice(InvoiceBuilder::new().build()).await;
        let session = h.service.initiate_payment(invoice_id, None, None).await.unwrap();

        let (_, receipt) = h.pay(&session.gateway_order_id, inr(500_000)).await.unwrap();

        assert!(receipt.is_fully_paid);
        assert_invoice_balance(&h.invoice(invoice_id).await, 500_000, InvoiceStatus::Paid);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use test_utils::installment_plan_strategy;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_installments_never_overpay((total, parts) in installment_plan_strategy()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let h = PaymentHarness::new();
                let invoice_id = h
                    .seed_invoice(InvoiceBuilder::new().with_total(inr(total)).build())
                    .await;

                let mut paid = 0i64;
                for part in parts {
                    let result = h.service.initiate_payment(invoice_id, Some(inr(part)), None).await;
                    if paid + part > total || paid == total {
                        assert!(result.is_err());
                        continue;
                    }
                    let session = result.unwrap();
                    h.pay(&session.gateway_order_id, inr(part)).await.unwrap();

                    let invoice = h.invoice(invoice_id).await;
                    assert!(invoice.paid_amount.minor_units() > paid);
                    paid = invoice.paid_amount.minor_units();
                    assert!(paid <= total);
                }

                let invoice = h.invoice(invoice_id).await;
                assert_eq!(invoice.paid_amount.minor_units(), paid);
                assert_eq!(invoice.status == InvoiceStatus::Paid, paid == total);
            });
        }
    }
}
