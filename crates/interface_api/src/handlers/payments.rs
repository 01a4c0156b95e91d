//! Payment handlers

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use core_kernel::{Currency, GatewayOrderId, GatewayPaymentId, InvoiceId};
use domain_payments::PaymentQuery;

use crate::auth::{permissions, require, Claims};
use crate::dto::payments::*;
use crate::{error::ApiError, AppState};

/// Starts a checkout for an invoice
pub async fn initiate_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    require(&claims, permissions::PAYMENT_WRITE)?;
    request.validate()?;

    let amount = request
        .amount
        .map(|amount| to_money(amount, request.currency.as_deref(), state.default_currency))
        .transpose()?;

    let session = state
        .service
        .initiate_payment(InvoiceId::from_uuid(id), amount, request.customer.map(Into::into))
        .await?;

    info!(
        user = %claims.sub,
        invoice_id = %session.invoice_id,
        order_id = %session.gateway_order_id,
        reused = session.reused,
        "Checkout initiated"
    );
    Ok(Json(session.into()))
}

/// Abandons the open checkout and starts a fresh one for the full balance
pub async fn retry_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<RetryPaymentRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    require(&claims, permissions::PAYMENT_WRITE)?;
    request.validate()?;

    let session = state
        .service
        .retry_payment(InvoiceId::from_uuid(id), request.customer.map(Into::into))
        .await?;
    Ok(Json(session.into()))
}

/// Checkout success callback
pub async fn payment_success(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<PaymentSuccessRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    require(&claims, permissions::PAYMENT_WRITE)?;
    request.validate()?;

    let receipt = state
        .service
        .handle_payment_success(
            &GatewayOrderId::new(request.order_id),
            &GatewayPaymentId::new(request.payment_id),
            &request.signature,
        )
        .await?;
    Ok(Json(receipt.into()))
}

/// Checkout failure callback
pub async fn payment_failure(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<PaymentFailureRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    require(&claims, permissions::PAYMENT_WRITE)?;
    request.validate()?;

    let payment_id = request.payment_id.clone().map(GatewayPaymentId::new);
    let order = state
        .service
        .handle_payment_failure(
            &GatewayOrderId::new(request.order_id.clone()),
            &request.report(),
            payment_id.as_ref(),
        )
        .await?;
    Ok(Json(order.into()))
}

/// Payment state of an invoice
pub async fn payment_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    require(&claims, permissions::PAYMENT_READ)?;
    let view = state.service.get_payment_status(InvoiceId::from_uuid(id)).await?;
    Ok(Json(view.into()))
}

/// Payment records of an invoice
pub async fn payment_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PaymentRecordResponse>>, ApiError> {
    require(&claims, permissions::PAYMENT_READ)?;
    let payments = state.service.get_payment_history(InvoiceId::from_uuid(id)).await?;
    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

/// Collection statistics
pub async fn payment_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<PaymentStatsResponse>, ApiError> {
    require(&claims, permissions::PAYMENT_READ)?;

    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::BadRequest("'from' must not be after 'to'".to_string()));
        }
    }
    let currency = query
        .currency
        .as_deref()
        .map(Currency::from_str)
        .transpose()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let stats = state
        .service
        .payment_stats(PaymentQuery {
            invoice_id: query.invoice_id.map(InvoiceId::from_uuid),
            currency,
            from: query.from,
            to: query.to,
        })
        .await?;
    Ok(Json(stats.try_into()?))
}

/// Refunds a settled payment
pub async fn refund_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(payment_id): Path<String>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<RefundResponse>, ApiError> {
    require(&claims, permissions::PAYMENT_REFUND)?;
    request.validate()?;

    let amount = request
        .amount
        .map(|amount| to_money(amount, request.currency.as_deref(), state.default_currency))
        .transpose()?;

    let outcome = state
        .service
        .refund(&GatewayPaymentId::new(payment_id), amount, request.speed)
        .await?;

    info!(
        user = %claims.sub,
        refund_id = %outcome.refund.gateway_refund_id,
        amount = %outcome.refund.amount,
        "Refund issued"
    );
    Ok(Json(outcome.try_into()?))
}
