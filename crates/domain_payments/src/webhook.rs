//! Gateway webhook envelope parsing
//!
//! The gateway posts events shaped like
//!
//! ```json
//! {
//!   "event": "payment.captured",
//!   "payload": {
//!     "payment": { "entity": { "id": "pay_..", "order_id": "order_..", ... } },
//!     "order":   { "entity": { "id": "order_..", ... } },
//!     "refund":  { "entity": { "id": "rfnd_..", "payment_id": "pay_..", ... } }
//!   }
//! }
//! ```
//!
//! Only the body is parsed here; authenticity is checked against the raw
//! bytes before parsing, and dispatch happens in the service.

use serde::Deserialize;

use core_kernel::{GatewayOrderId, GatewayPaymentId, GatewayRefundId};

use crate::error::{PaymentError, PaymentResult};
use crate::orders::FailureReport;
use crate::reconciler::Receipt;

/// A webhook event this core acts on
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    PaymentCaptured {
        order_id: GatewayOrderId,
        payment_id: GatewayPaymentId,
    },
    PaymentFailed {
        order_id: GatewayOrderId,
        payment_id: GatewayPaymentId,
        report: FailureReport,
    },
    OrderPaid {
        order_id: GatewayOrderId,
        payment_id: GatewayPaymentId,
    },
    RefundProcessed {
        refund_id: GatewayRefundId,
        payment_id: GatewayPaymentId,
        status: String,
    },
    /// Event type with no handler; acknowledged so the gateway stops redelivering
    Ignored(String),
}

/// What handling a webhook did
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Settled(Receipt),
    Duplicate(Receipt),
    FailureRecorded,
    Acknowledged,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Payload,
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    payment: Option<Wrapped<PaymentEntity>>,
    order: Option<Wrapped<OrderEntity>>,
    refund: Option<Wrapped<RefundEntity>>,
}

#[derive(Debug, Deserialize)]
struct Wrapped<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: Option<String>,
    error_code: Option<String>,
    error_description: Option<String>,
    error_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderEntity {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RefundEntity {
    id: String,
    payment_id: String,
    status: Option<String>,
}

impl WebhookEvent {
    /// Parses a raw webhook body
    pub fn parse(body: &[u8]) -> PaymentResult<Self> {
        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|err| PaymentError::validation(format!("malformed webhook payload: {}", err)))?;

        match envelope.event.as_str() {
            "payment.captured" => {
                let payment = required_payment(&envelope)?;
                Ok(WebhookEvent::PaymentCaptured {
                    order_id: payment_order_id(payment, &envelope.payload)?,
                    payment_id: GatewayPaymentId::new(payment.id.clone()),
                })
            }
            "payment.failed" => {
                let payment = required_payment(&envelope)?;
                Ok(WebhookEvent::PaymentFailed {
                    order_id: payment_order_id(payment, &envelope.payload)?,
                    payment_id: GatewayPaymentId::new(payment.id.clone()),
                    report: FailureReport {
                        error_code: payment
                            .error_code
                            .clone()
                            .unwrap_or_else(|| "PAYMENT_FAILED".to_string()),
                        error_description: payment
                            .error_description
                            .clone()
                            .unwrap_or_else(|| "payment failed".to_string()),
                        error_reason: payment.error_reason.clone(),
                    },
                })
            }
            "order.paid" => {
                let payment = required_payment(&envelope)?;
                Ok(WebhookEvent::OrderPaid {
                    order_id: payment_order_id(payment, &envelope.payload)?,
                    payment_id: GatewayPaymentId::new(payment.id.clone()),
                })
            }
            "refund.processed" => {
                let refund = envelope
                    .payload
                    .refund
                    .as_ref()
                    .map(|w| &w.entity)
                    .ok_or_else(|| PaymentError::validation("refund.processed without refund entity"))?;
                Ok(WebhookEvent::RefundProcessed {
                    refund_id: GatewayRefundId::new(refund.id.clone()),
                    payment_id: GatewayPaymentId::new(refund.payment_id.clone()),
                    status: refund.status.clone().unwrap_or_else(|| "processed".to_string()),
                })
            }
            other => Ok(WebhookEvent::Ignored(other.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            WebhookEvent::PaymentCaptured { .. } => "payment.captured",
            WebhookEvent::PaymentFailed { .. } => "payment.failed",
            WebhookEvent::OrderPaid { .. } => "order.paid",
            WebhookEvent::RefundProcessed { .. } => "refund.processed",
            WebhookEvent::Ignored(name) => name,
        }
    }
}

fn required_payment(envelope: &Envelope) -> PaymentResult<&PaymentEntity> {
    envelope
        .payload
        .payment
        .as_ref()
        .map(|w| &w.entity)
        .ok_or_else(|| PaymentError::validation(format!("{} without payment entity", envelope.event)))
}

/// Order id from the payment entity, falling back to the order entity
fn payment_order_id(payment: &PaymentEntity, payload: &Payload) -> PaymentResult<GatewayOrderId> {
    payment
        .order_id
        .clone()
        .or_else(|| payload.order.as_ref().map(|w| w.entity.id.clone()))
        .map(GatewayOrderId::new)
        .ok_or_else(|| PaymentError::validation(format!("payment {} has no order id", payment.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_parse_payment_captured() {
        let event = WebhookEvent::parse(&body(json!({
            "entity": "event",
            "event": "payment.captured",
            "payload": {
                "payment": { "entity": {
                    "id": "pay_29QQoUBi66xm2f",
                    "order_id": "order_9A33XWu170gUtm",
                    "status": "captured",
                    "amount": 500000
                }}
            }
        })))
        .unwrap();

        assert_eq!(
            event,
            WebhookEvent::PaymentCaptured {
                order_id: GatewayOrderId::new("order_9A33XWu170gUtm"),
                payment_id: GatewayPaymentId::new("pay_29QQoUBi66xm2f"),
            }
        );
    }

    #[test]
    fn test_parse_payment_failed_carries_error() {
        let event = WebhookEvent::parse(&body(json!({
            "event": "payment.failed",
            "payload": {
                "payment": { "entity": {
                    "id": "pay_1",
                    "order_id": "order_1",
                    "error_code": "BAD_REQUEST_ERROR",
                    "error_description": "Payment declined by bank",
                    "error_reason": "payment_declined"
                }}
            }
        })))
        .unwrap();

        match event {
            WebhookEvent::PaymentFailed { report, .. } => {
                assert_eq!(report.error_code, "BAD_REQUEST_ERROR");
                assert_eq!(report.error_reason.as_deref(), Some("payment_declined"));
            }
            other => panic!("expected payment.failed, got {other:?}"),
        }
    }

    #[test]
    fn test_order_paid_falls_back_to_order_entity() {
        let event = WebhookEvent::parse(&body(json!({
            "event": "order.paid",
            "payload": {
                "payment": { "entity": { "id": "pay_2" } },
                "order": { "entity": { "id": "order_2", "status": "paid" } }
            }
        })))
        .unwrap();

        assert_eq!(
            event,
            WebhookEvent::OrderPaid {
                order_id: GatewayOrderId::new("order_2"),
                payment_id: GatewayPaymentId::new("pay_2"),
            }
        );
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let event = WebhookEvent::parse(&body(json!({
            "event": "subscription.charged",
            "payload": {}
        })))
        .unwrap();
        assert_eq!(event, WebhookEvent::Ignored("subscription.charged".to_string()));
    }

    #[test]
    fn test_malformed_body_is_validation_error() {
        let err = WebhookEvent::parse(b"not json").unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
    }

    #[test]
    fn test_captured_without_payment_rejected() {
        let err = WebhookEvent::parse(&body(json!({ "event": "payment.captured", "payload": {} }))).unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
    }
}
