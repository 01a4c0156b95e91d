//! Fire-and-forget notifications after settlement or failure
//!
//! Notifier errors are logged and dropped. Financial state is already
//! committed when a notification is triggered.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

use core_kernel::{DomainPort, GatewayOrderId, InvoiceId, PortError};

use crate::reconciler::Receipt;

/// Event delivered to the notifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    Succeeded {
        receipt: Receipt,
        customer_email: Option<String>,
    },
    Failed {
        invoice_id: InvoiceId,
        gateway_order_id: GatewayOrderId,
        reason: String,
        customer_email: Option<String>,
    },
}

impl PaymentEvent {
    pub fn customer_email(&self) -> Option<&str> {
        match self {
            PaymentEvent::Succeeded { customer_email, .. } | PaymentEvent::Failed { customer_email, .. } => {
                customer_email.as_deref()
            }
        }
    }

    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            PaymentEvent::Succeeded { receipt, .. } => receipt.invoice_id,
            PaymentEvent::Failed { invoice_id, .. } => *invoice_id,
        }
    }
}

/// Port to the email / in-app notification system
#[async_trait]
pub trait Notifier: DomainPort {
    /// Stores an in-app notification
    async fn record_in_app(&self, event: &PaymentEvent) -> Result<(), PortError>;

    /// Sends an email to the customer
    async fn send_email(&self, to: &str, event: &PaymentEvent) -> Result<(), PortError>;
}

/// Notifier that only writes a log line, used when nothing else is wired
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl DomainPort for LogNotifier {}

#[async_trait]
impl Notifier for LogNotifier {
    async fn record_in_app(&self, event: &PaymentEvent) -> Result<(), PortError> {
        tracing::info!(invoice_id = %event.invoice_id(), "payment notification recorded");
        Ok(())
    }

    async fn send_email(&self, to: &str, event: &PaymentEvent) -> Result<(), PortError> {
        tracing::info!(invoice_id = %event.invoice_id(), to, "payment email skipped, no mailer configured");
        Ok(())
    }
}

/// Spawns notifier calls without awaiting them
#[derive(Clone)]
pub struct NotificationTrigger {
    notifier: Arc<dyn Notifier>,
}

impl NotificationTrigger {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Delivers the event on a background task
    ///
    /// The returned handle never yields an error; failures are logged.
    pub fn fire(&self, event: PaymentEvent) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let invoice_id = event.invoice_id();
            if let Err(err) = notifier.record_in_app(&event).await {
                tracing::warn!(invoice_id = %invoice_id, error = %err, "in-app notification failed");
            }
            if let Some(email) = event.customer_email() {
                if let Err(err) = notifier.send_email(email, &event).await {
                    tracing::warn!(invoice_id = %invoice_id, error = %err, "payment email failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FailingNotifier, RecordingNotifier};

    fn failed_event(email: Option<&str>) -> PaymentEvent {
        PaymentEvent::Failed {
            invoice_id: InvoiceId::new(),
            gateway_order_id: GatewayOrderId::new("order_1"),
            reason: "card declined".to_string(),
            customer_email: email.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_fire_records_and_emails() {
        let notifier = Arc::new(RecordingNotifier::new());
        let trigger = NotificationTrigger::new(notifier.clone());

        trigger.fire(failed_event(Some("fleet@example.com"))).await.unwrap();

        assert_eq!(notifier.in_app_events().await.len(), 1);
        assert_eq!(notifier.emails().await, vec!["fleet@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_no_email_without_address() {
        let notifier = Arc::new(RecordingNotifier::new());
        let trigger = NotificationTrigger::new(notifier.clone());

        trigger.fire(failed_event(None)).await.unwrap();

        assert_eq!(notifier.in_app_events().await.len(), 1);
        assert!(notifier.emails().await.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let trigger = NotificationTrigger::new(Arc::new(FailingNotifier));
        let handle = trigger.fire(failed_event(Some("fleet@example.com")));
        assert!(handle.await.is_ok());
    }
}
