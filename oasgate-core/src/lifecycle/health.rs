//! Liveness and readiness probe handlers.
//!
//! | Endpoint | Condition | Status |
//! |----------|-----------|--------|
//! | /health  | Process alive | 200 |
//! | /health  | Process stopped | 503 |
//! | /ready   | Contract loaded and state Ready | 200 |
//! | /ready   | Still starting | 503 |
//! | /ready   | Shutting down | 503 |

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;

use super::{LifecycleManager, LifecycleState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct UnhealthyResponse {
    pub status: &'static str,
    pub reason: &'static str,
}

/// Individual readiness conditions.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessChecks {
    pub contract_loaded: bool,
}

impl ReadinessChecks {
    #[must_use]
    pub fn all_pass(&self) -> bool {
        self.contract_loaded
    }

    #[must_use]
    pub fn first_failure(&self) -> Option<&'static str> {
        (!self.contract_loaded).then_some("contract_loaded")
    }
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Router serving `/health` and `/ready`.
pub fn health_router(lifecycle: Arc<LifecycleManager>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(readiness_handler))
        .with_state(lifecycle)
}

async fn health_handler(State(lifecycle): State<Arc<LifecycleManager>>) -> Response {
    if matches!(lifecycle.state(), LifecycleState::Stopped) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(UnhealthyResponse {
                status: "unhealthy",
                reason: "service_stopped",
            }),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            version: lifecycle.version(),
            uptime_seconds: lifecycle.uptime_seconds(),
        }),
    )
        .into_response()
}

async fn readiness_handler(State(lifecycle): State<Arc<LifecycleManager>>) -> Response {
    let checks = lifecycle.readiness_checks();

    if lifecycle.is_shutting_down() {
        return not_ready(checks, "shutting_down".to_string());
    }

    if checks.all_pass() && lifecycle.is_ready() {
        return (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                checks,
                reason: None,
            }),
        )
            .into_response();
    }

    let reason = match checks.first_failure() {
        Some(failed) => failed.to_string(),
        None => format!("lifecycle_state: {}", lifecycle.state()),
    };
    not_ready(checks, reason)
}

fn not_ready(checks: ReadinessChecks, reason: String) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ReadinessResponse {
            status: "not_ready",
            checks,
            reason: Some(reason),
        }),
    )
        .into_response()
}
