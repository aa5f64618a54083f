//! Check calls through the gRPC service surface.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use envoy_types::pb::envoy::service::auth::v3::authorization_server::Authorization;
use envoy_types::pb::envoy::service::auth::v3::check_response::HttpResponse;
use envoy_types::pb::envoy::service::auth::v3::{CheckResponse, DeniedHttpResponse};
use helpers::{check_request, non_http_request, service, service_with};
use oasgate_core::config::NonHttpPolicy;
use oasgate_core::{
    CheckSubject, EngineError, PipelineConfig, ValidationEngine, ValidationOutcome,
};
use serde_json::Value;
use tonic::{Code, Request};

const JSON: (&str, &str) = ("content-type", "application/json");

fn denied(resp: CheckResponse) -> DeniedHttpResponse {
    assert_eq!(resp.status.as_ref().map(|s| s.code), Some(Code::PermissionDenied as i32));
    match resp.http_response {
        Some(HttpResponse::DeniedResponse(denied)) => denied,
        other => panic!("expected denied response, got {other:?}"),
    }
}

fn details(denied: &DeniedHttpResponse) -> Vec<Value> {
    let json: Value = serde_json::from_str(&denied.body).unwrap();
    assert_eq!(json["error"], "OAS_VALIDATION_FAILED");
    assert_eq!(json["message"], "Request does not conform to OpenAPI specification");
    json["details"].as_array().cloned().unwrap_or_default()
}

fn assert_allowed(resp: &CheckResponse) {
    assert_eq!(resp.status.as_ref().map(|s| s.code), Some(Code::Ok as i32));
    assert!(matches!(resp.http_response, Some(HttpResponse::OkResponse(_))));
}

#[tokio::test]
async fn test_conforming_request_is_allowed() {
    let svc = service();
    let req = check_request(
        "POST",
        "/api/orders",
        &[JSON],
        r#"{"sku": "abc-1", "quantity": 2, "note": null}"#,
    );

    let resp = svc.check(Request::new(req)).await.unwrap().into_inner();
    assert_allowed(&resp);
}

#[tokio::test]
async fn test_schema_violation_is_denied_with_400() {
    let svc = service();
    let req = check_request("POST", "/api/orders", &[JSON], r#"{"sku": "abc", "quantity": 0}"#);

    let denied = denied(svc.check(Request::new(req)).await.unwrap().into_inner());
    assert_eq!(denied.status.as_ref().map(|s| s.code), Some(400));

    let header = denied.headers[0].header.as_ref().unwrap();
    assert_eq!(header.key, "content-type");
    assert_eq!(header.value, "application/json");

    let details = details(&denied);
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["field"], "$.quantity");
    assert_eq!(details[0]["location"], "body");
}

#[tokio::test]
async fn test_missing_required_property_points_at_the_property() {
    let svc = service();
    let req = check_request("POST", "/api/orders", &[JSON], r#"{"sku": "abc"}"#);

    let denied = denied(svc.check(Request::new(req)).await.unwrap().into_inner());
    let details = details(&denied);
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["field"], "$.quantity");
    assert!(details[0]["message"].as_str().unwrap().contains("quantity"));
}

#[tokio::test]
async fn test_unknown_path_is_denied() {
    let svc = service();
    let req = check_request("GET", "/api/customers", &[], "");

    let denied = denied(svc.check(Request::new(req)).await.unwrap().into_inner());
    let details = details(&denied);
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["field"], "path.missing");
    assert_eq!(details[0]["location"], "GET /api/customers");
}

#[tokio::test]
async fn test_missing_header_and_bad_path_param() {
    let svc = service();

    let resp = svc.evaluate(&check_request("GET", "/api/orders/17", &[], "")).unwrap();
    let details = details(&denied(resp));
    assert_eq!(details[0]["field"], "x-tenant");
    assert_eq!(details[0]["location"], "GET /api/orders/17");

    let resp = svc
        .evaluate(&check_request("GET", "/api/orders/seventeen", &[("x-tenant", "acme")], ""))
        .unwrap();
    let details = crate::details(&denied(resp));
    assert_eq!(details[0]["field"], "orderId");
    assert_eq!(details[0]["location"], "path");

    let resp = svc
        .evaluate(&check_request("GET", "/api/orders/17", &[("X-Tenant", "acme")], ""))
        .unwrap();
    assert_allowed(&resp);
}

#[tokio::test]
async fn test_non_http_check_follows_policy() {
    let allow = service();
    assert_allowed(&allow.evaluate(&non_http_request()).unwrap());

    let deny = service_with(
        helpers::contract_engine(),
        PipelineConfig {
            non_http_policy: NonHttpPolicy::Deny,
            ..PipelineConfig::default()
        },
    );
    let details = details(&denied(deny.evaluate(&non_http_request()).unwrap()));
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["field"], "request.protocol");
}

struct FailingEngine(AtomicUsize);

impl ValidationEngine for FailingEngine {
    fn validate(&self, _: &CheckSubject) -> Result<ValidationOutcome, EngineError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(EngineError::Internal("model unavailable".to_string()))
    }
}

#[tokio::test]
async fn test_engine_failure_is_internal_not_allow() {
    let engine = Arc::new(FailingEngine(AtomicUsize::new(0)));
    let svc = service_with(engine.clone(), PipelineConfig::default());

    let status = svc
        .check(Request::new(check_request("GET", "/api/orders/1", &[], "")))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("model unavailable"));
    assert_eq!(engine.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_non_http_check_never_reaches_engine() {
    let engine = Arc::new(FailingEngine(AtomicUsize::new(0)));
    let svc = service_with(engine.clone(), PipelineConfig::default());

    assert_allowed(&svc.evaluate(&non_http_request()).unwrap());
    assert_eq!(engine.0.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_checks() {
    let svc = Arc::new(service());

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let svc = svc.clone();
            tokio::spawn(async move {
                let path = if i % 2 == 0 { "/api/orders/5" } else { "/api/nope" };
                let req = check_request("GET", path, &[("x-tenant", "t")], "");
                (i, svc.check(Request::new(req)).await.unwrap().into_inner())
            })
        })
        .collect();

    for task in tasks {
        let (i, resp) = task.await.unwrap();
        let allowed = matches!(resp.http_response, Some(HttpResponse::OkResponse(_)));
        assert_eq!(allowed, i % 2 == 0);
    }
}
