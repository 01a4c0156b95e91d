//! Request middleware for the `/api/v1` routes

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use crate::auth::{validate_token, Claims};
use crate::error::ApiError;
use crate::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Rejects requests without a valid bearer token; on success the
/// [`Claims`] are available to handlers as an extension
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(request.headers()) else {
        warn!(uri = %request.uri(), "Missing bearer token");
        return Err(ApiError::Unauthorized("missing bearer token".to_string()));
    };

    let claims = validate_token(token, state.jwt_secret.expose_secret()).map_err(|e| {
        warn!(error = %e, "Token rejected");
        ApiError::Unauthorized(e.to_string())
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// One log line per API call: operator, route, status and latency
pub async fn audit_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let operator = request
        .extensions()
        .get::<Claims>()
        .map(|c| c.sub.clone())
        .unwrap_or_else(|| "anonymous".to_string());
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let started = Instant::now();
    let response = next.run(request).await;

    info!(
        %method,
        %path,
        %operator,
        %request_id,
        status = response.status().as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        "audit"
    );
    response
}
