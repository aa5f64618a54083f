//! Admin HTTP server.
//!
//! Runs on its own port (default 9001) so probes and scrapes never share a
//! listener with Envoy's Check traffic:
//!
//! - `GET /health`: liveness
//! - `GET /ready`: readiness (contract loaded, not shutting down)
//! - `GET /metrics`: OpenMetrics text from the shared registry

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::ProxyError;
use oasgate_core::lifecycle::{LifecycleManager, health_router};

const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Debug, Clone)]
pub struct AdminServerConfig {
    pub port: u16,
    pub bind_addr: String,
}

impl AdminServerConfig {
    pub fn new(bind_addr: impl Into<String>, port: u16) -> Self {
        Self {
            port,
            bind_addr: bind_addr.into(),
        }
    }

    pub fn bind_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[derive(Clone)]
pub struct AdminState {
    pub lifecycle: Arc<LifecycleManager>,
    pub prom_registry: Arc<Registry>,
}

pub struct AdminServer {
    config: AdminServerConfig,
    state: AdminState,
}

impl AdminServer {
    pub fn with_config(
        lifecycle: Arc<LifecycleManager>,
        prom_registry: Arc<Registry>,
        config: AdminServerConfig,
    ) -> Self {
        Self {
            config,
            state: AdminState {
                lifecycle,
                prom_registry,
            },
        }
    }

    /// Probe routes from the core lifecycle merged with `/metrics`.
    pub fn router(&self) -> Router {
        let metrics_router = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone());

        health_router(self.state.lifecycle.clone()).merge(metrics_router)
    }

    /// Serves until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Bind`] if the listener cannot be bound and
    /// [`ProxyError::Admin`] if serving fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ProxyError> {
        let bind_addr = self.config.bind_string();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ProxyError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;

        info!(addr = %bind_addr, "Admin server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("Admin server shutting down");
            })
            .await
            .map_err(ProxyError::Admin)
    }
}

async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    let mut buffer = String::new();

    if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &state.prom_registry) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {e}"),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use oasgate_core::lifecycle::LifecycleConfig;
    use oasgate_core::telemetry::CheckMetrics;
    use tower::ServiceExt;

    fn admin(registry: Registry) -> (Arc<LifecycleManager>, Router) {
        let lifecycle = Arc::new(LifecycleManager::new(LifecycleConfig::default()));
        let server = AdminServer::with_config(
            lifecycle.clone(),
            Arc::new(registry),
            AdminServerConfig::new("127.0.0.1", 0),
        );
        (lifecycle, server.router())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_, router) = admin(Registry::default());

        let response = router.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert!(json["version"].is_string());
        assert!(json["uptime_seconds"].is_number());
    }

    #[tokio::test]
    async fn test_readiness_endpoint_not_ready() {
        let (_, router) = admin(Registry::default());

        let response = router.oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let json = json_body(response).await;
        assert_eq!(json["status"], "not_ready");
        assert_eq!(json["checks"]["contract_loaded"], false);
    }

    #[tokio::test]
    async fn test_readiness_endpoint_ready() {
        let (lifecycle, router) = admin(Registry::default());
        lifecycle.mark_contract_loaded();
        lifecycle.mark_ready();

        let response = router.oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "ready");
        assert_eq!(json["checks"]["contract_loaded"], true);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_exports_check_metrics() {
        let mut registry = Registry::default();
        let metrics = CheckMetrics::new(&mut registry);
        metrics.record_decision("deny", 2, 0.4);
        metrics.record_engine_error(0.1);

        let (_, router) = admin(registry);
        let response = router.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.contains("openmetrics"));

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("oasgate_checks_total{decision=\"deny\"} 1"));
        assert!(text.contains("oasgate_violations_total 2"));
        assert!(text.contains("oasgate_engine_errors_total 1"));
        assert!(text.contains("oasgate_check_duration_ms"));
    }

    #[test]
    fn test_admin_config_bind_string() {
        let config = AdminServerConfig::new("127.0.0.1", 9101);
        assert_eq!(config.bind_string(), "127.0.0.1:9101");
    }
}
