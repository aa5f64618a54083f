//! Envoy `ext_authz` gRPC service.
//!
//! Maps `envoy.service.auth.v3.CheckRequest` onto the core pipeline and the
//! encoded verdict back onto `CheckResponse`:
//!
//! | Verdict | `status.code` | `http_response` |
//! |---------|---------------|-----------------|
//! | Allow | `OK` | `OkHttpResponse` |
//! | Deny | `PERMISSION_DENIED` | `DeniedHttpResponse{status, headers, body}` |
//! | Engine error | gRPC `INTERNAL` returned from the call | none |

use std::sync::Arc;

use envoy_types::pb::envoy::config::core::v3::{HeaderValue, HeaderValueOption};
use envoy_types::pb::envoy::r#type::v3::HttpStatus;
use envoy_types::pb::envoy::service::auth::v3::attribute_context::HttpRequest;
use envoy_types::pb::envoy::service::auth::v3::authorization_server::Authorization;
use envoy_types::pb::envoy::service::auth::v3::check_response::HttpResponse;
use envoy_types::pb::envoy::service::auth::v3::{
    CheckRequest, CheckResponse, DeniedHttpResponse, OkHttpResponse,
};
use envoy_types::pb::google::rpc::Status as RpcStatus;
use oasgate_core::lifecycle::LifecycleManager;
use oasgate_core::{CheckPipeline, DeniedResponse, EncodedVerdict, HttpAttributes};
use tonic::{Code, Request, Response, Status};

/// Read-only view of Envoy's HTTP request attributes.
pub struct EnvoyHttpRequest<'a>(pub &'a HttpRequest);

impl HttpAttributes for EnvoyHttpRequest<'_> {
    fn method(&self) -> &str {
        &self.0.method
    }

    fn path(&self) -> &str {
        &self.0.path
    }

    fn host(&self) -> &str {
        &self.0.host
    }

    /// Envoy fills `header_map` instead of `headers` when raw header
    /// encoding is enabled.
    fn header_pairs(&self) -> Vec<(String, String)> {
        if !self.0.headers.is_empty() {
            return self
                .0
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }

        self.0
            .header_map
            .as_ref()
            .map(|map| {
                map.headers
                    .iter()
                    .map(|h| {
                        let value = if h.value.is_empty() {
                            String::from_utf8_lossy(&h.raw_value).into_owned()
                        } else {
                            h.value.clone()
                        };
                        (h.key.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn body(&self) -> &[u8] {
        if self.0.raw_body.is_empty() {
            self.0.body.as_bytes()
        } else {
            &self.0.raw_body
        }
    }
}

/// The `Authorization` service implementation.
pub struct AuthzService {
    pipeline: Arc<CheckPipeline>,
    lifecycle: Arc<LifecycleManager>,
}

impl AuthzService {
    pub fn new(pipeline: Arc<CheckPipeline>, lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            pipeline,
            lifecycle,
        }
    }

    /// Runs one check without the gRPC envelope.
    pub fn evaluate(&self, request: &CheckRequest) -> Result<CheckResponse, Status> {
        let _guard = self.lifecycle.track_check();

        let http = request
            .attributes
            .as_ref()
            .and_then(|attrs| attrs.request.as_ref())
            .and_then(|req| req.http.as_ref())
            .map(EnvoyHttpRequest);

        self.pipeline
            .check(http.as_ref())
            .map(to_check_response)
            .map_err(|e| Status::internal(e.to_string()))
    }
}

#[tonic::async_trait]
impl Authorization for AuthzService {
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        self.evaluate(request.get_ref()).map(Response::new)
    }
}

/// Maps an encoded verdict onto the Envoy response.
pub fn to_check_response(verdict: EncodedVerdict) -> CheckResponse {
    match verdict {
        EncodedVerdict::Allow => CheckResponse {
            status: Some(rpc_status(Code::Ok)),
            http_response: Some(HttpResponse::OkResponse(OkHttpResponse::default())),
            ..Default::default()
        },
        EncodedVerdict::Deny(denied) => CheckResponse {
            status: Some(rpc_status(Code::PermissionDenied)),
            http_response: Some(HttpResponse::DeniedResponse(denied_http_response(denied))),
            ..Default::default()
        },
    }
}

fn rpc_status(code: Code) -> RpcStatus {
    RpcStatus {
        code: code as i32,
        ..Default::default()
    }
}

fn denied_http_response(denied: DeniedResponse) -> DeniedHttpResponse {
    let headers = denied
        .headers
        .into_iter()
        .map(|(key, value)| HeaderValueOption {
            header: Some(HeaderValue {
                key,
                value,
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    DeniedHttpResponse {
        status: Some(HttpStatus {
            code: i32::from(denied.status_code),
        }),
        headers,
        body: denied.body,
    }
}
