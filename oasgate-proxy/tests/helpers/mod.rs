//! Shared fixtures for proxy integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use envoy_types::pb::envoy::service::auth::v3::attribute_context::{HttpRequest, Request};
use envoy_types::pb::envoy::service::auth::v3::{AttributeContext, CheckRequest};
use oasgate_core::contract::{build_queryable_model, load_contract};
use oasgate_core::lifecycle::{LifecycleConfig, LifecycleManager};
use oasgate_core::{CheckPipeline, PipelineConfig, ValidationEngine};
use oasgate_proxy::authz::AuthzService;

/// Orders API, JSON form.
pub const ORDERS_CONTRACT: &str = r##"{
  "openapi": "3.1.0",
  "info": {"title": "Orders", "version": "2"},
  "servers": [{"url": "/api"}],
  "paths": {
    "/orders": {
      "post": {
        "requestBody": {
          "required": true,
          "content": {
            "application/json": {
              "schema": {
                "type": "object",
                "required": ["sku", "quantity"],
                "properties": {
                  "sku": {"type": "string", "minLength": 3},
                  "quantity": {"type": "integer", "minimum": 1},
                  "note": {"type": ["string", "null"]}
                }
              }
            }
          }
        },
        "responses": {"201": {"description": "created"}}
      }
    },
    "/orders/{orderId}": {
      "get": {
        "parameters": [
          {"name": "orderId", "in": "path", "required": true, "schema": {"type": "integer"}},
          {"name": "x-tenant", "in": "header", "required": true, "schema": {"type": "string"}}
        ],
        "responses": {"200": {"description": "ok"}}
      }
    }
  }
}"##;

pub fn lifecycle() -> Arc<LifecycleManager> {
    Arc::new(LifecycleManager::new(LifecycleConfig::default()))
}

pub fn contract_engine() -> Arc<dyn ValidationEngine> {
    let doc = load_contract(ORDERS_CONTRACT.as_bytes()).unwrap();
    Arc::new(build_queryable_model(doc).unwrap())
}

pub fn service_with(engine: Arc<dyn ValidationEngine>, config: PipelineConfig) -> AuthzService {
    AuthzService::new(Arc::new(CheckPipeline::new(engine, config)), lifecycle())
}

pub fn service() -> AuthzService {
    service_with(contract_engine(), PipelineConfig::default())
}

/// An Envoy check request for one HTTP request.
pub fn check_request(
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> CheckRequest {
    let http = HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        host: "orders.internal".to_string(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        body: body.to_string(),
        ..Default::default()
    };

    CheckRequest {
        attributes: Some(AttributeContext {
            request: Some(Request {
                http: Some(http),
                ..Default::default()
            }),
            ..Default::default()
        }),
    }
}

/// A check request with no HTTP attributes (e.g. a TCP filter check).
pub fn non_http_request() -> CheckRequest {
    CheckRequest {
        attributes: Some(AttributeContext::default()),
    }
}
