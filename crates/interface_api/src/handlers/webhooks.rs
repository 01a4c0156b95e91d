//! Gateway webhook handler
//!
//! The body must reach the signature check byte for byte, so it is taken
//! as raw `Bytes` rather than parsed JSON.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use tracing::warn;

use crate::dto::payments::WebhookResponse;
use crate::{error::ApiError, AppState};

/// Header carrying the HMAC-SHA256 of the raw body
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Receives a gateway webhook
///
/// Returns 200 for every authenticated event, including ones this core
/// does not act on, so the gateway stops redelivering them.
pub async fn receive_gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());

    let Some(signature) = signature else {
        warn!("Webhook without signature header rejected");
        return Err(ApiError::Unauthorized("missing webhook signature".to_string()));
    };

    let outcome = state.service.handle_webhook(&body, signature).await?;
    Ok(Json(outcome.into()))
}
