//! REST client for the payment gateway
//!
//! Speaks the gateway's JSON API over HTTPS with basic auth (key id and key
//! secret). Wire structs are private; responses are mapped into the typed
//! port structs before they leave this module.
//!
//! # Error Handling
//!
//! HTTP failures are mapped to `PortError` variants:
//! - 400/422 -> `PortError::Validation`
//! - 404 -> `PortError::NotFound`
//! - 401/403 -> `PortError::Unauthorized`
//! - 429 -> `PortError::RateLimited`
//! - 5xx -> `PortError::ServiceUnavailable`
//! - Timeouts -> `PortError::Timeout`
//! - Connection failures -> `PortError::Connection`

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use core_kernel::{
    Currency, DomainPort, GatewayOrderId, GatewayPaymentId, GatewayRefundId, PortError,
};

use super::{
    CreateOrderRequest, GatewayConfig, GatewayOrder, GatewayPaymentDetails, GatewayPaymentStatus,
    GatewayRefund, PaymentGateway, RefundRequest,
};
use crate::error::{PaymentError, PaymentResult};

const SERVICE: &str = "payment-gateway";

/// HTTP implementation of [`PaymentGateway`]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: SecretString,
    timeout: Duration,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl HttpGateway {
    /// Builds a client from validated configuration
    pub fn from_config(config: &GatewayConfig) -> PaymentResult<Self> {
        config.validate()?;
        let key_secret = config
            .key_secret
            .as_ref()
            .map(|secret| SecretString::new(secret.expose_secret().clone()))
            .ok_or_else(|| PaymentError::configuration("gateway key secret is not set"))?;
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret,
            timeout,
        })
    }

    async fn send<B, T>(&self, method: Method, path: &str, operation: &str, body: Option<&B>) -> Result<T, PortError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(operation, status = status.as_u16(), "gateway returned error response");
            return Err(map_status(status, operation, &text));
        }

        response.json::<T>().await.map_err(|e| PortError::Transformation {
            message: format!("{} response could not be decoded: {}", operation, e),
        })
    }

    fn map_transport_error(&self, operation: &str, err: reqwest::Error) -> PortError {
        if err.is_timeout() {
            PortError::Timeout {
                operation: operation.to_string(),
                duration_ms: self.timeout.as_millis() as u64,
            }
        } else {
            PortError::Connection {
                message: format!("{} request failed", operation),
                source: Some(Box::new(err)),
            }
        }
    }
}

/// Maps a non-success HTTP status to a port error
fn map_status(status: StatusCode, operation: &str, body: &str) -> PortError {
    let error = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|envelope| envelope.error);
    let field = error.as_ref().and_then(|e| e.field.clone());
    let description = error
        .and_then(|e| e.description)
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status {
        StatusCode::NOT_FOUND => PortError::NotFound {
            entity_type: operation.to_string(),
            id: description,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized {
            message: description,
        },
        StatusCode::TOO_MANY_REQUESTS => PortError::RateLimited { retry_after_secs: 1 },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => PortError::Validation {
            message: description,
            field,
        },
        s if s.is_server_error() => PortError::unavailable(SERVICE),
        _ => PortError::internal(format!("{} failed with HTTP {}: {}", operation, status, description)),
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    description: Option<String>,
    field: Option<String>,
}

#[derive(Serialize)]
struct OrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: &'a BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct OrderEntity {
    id: String,
    status: String,
    amount: i64,
    currency: String,
}

#[derive(Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: Option<String>,
    status: GatewayPaymentStatus,
    #[serde(default)]
    method: String,
    amount: i64,
    currency: String,
    fee: Option<i64>,
    tax: Option<i64>,
    bank: Option<String>,
    wallet: Option<String>,
    vpa: Option<String>,
    error_code: Option<String>,
    error_description: Option<String>,
}

#[derive(Serialize)]
struct RefundBody<'a> {
    amount: i64,
    speed: &'a str,
}

#[derive(Deserialize)]
struct RefundEntity {
    id: String,
    status: String,
    amount: i64,
}

fn parse_currency(code: &str) -> Result<Currency, PortError> {
    Currency::from_str(code).map_err(|e| PortError::Transformation {
        message: e.to_string(),
    })
}

impl DomainPort for HttpGateway {}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, PortError> {
        let body = OrderBody {
            amount: request.amount.minor_units(),
            currency: request.amount.currency().code(),
            receipt: &request.receipt,
            notes: &request.notes,
        };
        let entity: OrderEntity = self.send(Method::POST, "orders", "create_order", Some(&body)).await?;

        Ok(GatewayOrder {
            id: GatewayOrderId::new(entity.id),
            status: entity.status,
            amount_minor: entity.amount,
            currency: parse_currency(&entity.currency)?,
        })
    }

    async fn fetch_payment(&self, payment_id: &GatewayPaymentId) -> Result<GatewayPaymentDetails, PortError> {
        let path = format!("payments/{}", payment_id);
        let entity: PaymentEntity = self
            .send::<(), _>(Method::GET, &path, "fetch_payment", None)
            .await?;

        Ok(GatewayPaymentDetails {
            id: GatewayPaymentId::new(entity.id),
            order_id: entity.order_id.map(GatewayOrderId::new),
            status: entity.status,
            method: entity.method,
            amount_minor: entity.amount,
            currency: parse_currency(&entity.currency)?,
            fee_minor: entity.fee,
            tax_minor: entity.tax,
            bank: entity.bank,
            wallet: entity.wallet,
            vpa: entity.vpa,
            error_code: entity.error_code,
            error_description: entity.error_description,
        })
    }

    async fn refund(&self, request: &RefundRequest) -> Result<GatewayRefund, PortError> {
        let path = format!("payments/{}/refund", request.payment_id);
        let body = RefundBody {
            amount: request.amount.minor_units(),
            speed: request.speed.as_str(),
        };
        let entity: RefundEntity = self.send(Method::POST, &path, "refund", Some(&body)).await?;

        Ok(GatewayRefund {
            id: GatewayRefundId::new(entity.id),
            status: entity.status,
            amount_minor: entity.amount,
        })
    }
}
