//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use core_kernel::AdapterHealth;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct DependencyStatus {
    pub component: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub version: String,
    pub dependencies: Vec<DependencyStatus>,
}

/// Liveness probe
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness probe
///
/// 503 if any registered dependency reports unhealthy.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let mut dependencies = Vec::with_capacity(state.health_checks.len());
    for check in &state.health_checks {
        let result = check.health_check().await;
        dependencies.push(DependencyStatus {
            component: result.adapter_id,
            status: result.status,
            latency_ms: result.latency_ms,
            message: result.message,
        });
    }

    let unhealthy = dependencies
        .iter()
        .filter(|d| d.status == AdapterHealth::Unhealthy)
        .count();
    let ready = unhealthy == 0;
    if !ready {
        warn!(unhealthy, "Readiness check failed");
    }

    let (status, label) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        status,
        Json(ReadinessResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            dependencies,
        }),
    )
}
