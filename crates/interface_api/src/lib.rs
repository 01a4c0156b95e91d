//! HTTP API Layer
//!
//! REST surface of the payment reconciliation core, built on Axum.
//!
//! # Architecture
//!
//! - **Handlers**: checkout initiation, checkout callbacks, status/history,
//!   refunds, statistics, the gateway webhook and health checks
//! - **Middleware**: JWT authentication and audit logging on `/api/v1`
//! - **DTOs**: request/response bodies with amounts in major units
//! - **Error Handling**: `PaymentError` mapped onto status codes
//!
//! The webhook route sits outside the JWT layer; it is authenticated by
//! the gateway's HMAC signature header instead.
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let app = create_router(AppState::new(service, secret, Currency::INR));
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use secrecy::SecretString;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use core_kernel::{Currency, HealthCheckable};
use domain_payments::PaymentService;

use crate::handlers::{health, payments, webhooks};
use crate::middleware::{audit_middleware, auth_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PaymentService>,
    pub jwt_secret: SecretString,
    /// Currency assumed for request amounts that do not name one
    pub default_currency: Currency,
    /// Dependencies probed by `/health/ready`
    pub health_checks: Vec<Arc<dyn HealthCheckable>>,
}

impl AppState {
    pub fn new(service: Arc<PaymentService>, jwt_secret: SecretString, default_currency: Currency) -> Self {
        Self {
            service,
            jwt_secret,
            default_currency,
            health_checks: Vec::new(),
        }
    }

    /// Adds a dependency to the readiness probe
    pub fn with_health_check(mut self, check: Arc<dyn HealthCheckable>) -> Self {
        self.health_checks.push(check);
        self
    }
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/webhooks/gateway", post(webhooks::receive_gateway_webhook));

    // Invoice-scoped payment routes
    let invoice_routes = Router::new()
        .route("/:id/payments", post(payments::initiate_payment))
        .route("/:id/payments", get(payments::payment_history))
        .route("/:id/payments/retry", post(payments::retry_payment))
        .route("/:id/payment-status", get(payments::payment_status));

    // Checkout callbacks, refunds and statistics
    let payment_routes = Router::new()
        .route("/callback/success", post(payments::payment_success))
        .route("/callback/failure", post(payments::payment_failure))
        .route("/stats", get(payments::payment_stats))
        .route("/:payment_id/refunds", post(payments::refund_payment));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/invoices", invoice_routes)
        .nest("/payments", payment_routes)
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    let http_layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(http_layers)
        .with_state(state)
}
