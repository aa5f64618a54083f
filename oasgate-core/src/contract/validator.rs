//! The OpenAPI validation engine.

use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::params::{Parameter, RequestParameters};
use super::path::{PathTemplate, split_segments};
use super::schema::CompiledSchema;
use crate::engine::{EngineError, ValidationEngine, ValidationOutcome};
use crate::subject::CheckSubject;
use crate::violation::{SchemaViolation, ViolationRecord};

/// A compiled contract, ready to validate requests.
///
/// Built once by [`super::build_queryable_model`] and shared read-only by all
/// checks.
#[derive(Debug)]
pub struct OpenApiValidator {
    /// Longest first.
    base_paths: Vec<String>,
    routes: Vec<Route>,
}

#[derive(Debug)]
pub(crate) struct Route {
    pub(crate) template: PathTemplate,
    pub(crate) operations: HashMap<Method, Operation>,
}

#[derive(Debug)]
pub(crate) struct Operation {
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) request_body: Option<RequestBody>,
}

#[derive(Debug)]
pub(crate) struct RequestBody {
    pub(crate) required: bool,
    pub(crate) media: Vec<MediaType>,
}

#[derive(Debug)]
pub(crate) struct MediaType {
    /// Lower-cased media range: `application/json`, `text/*`, `*/*`.
    pub(crate) range: String,
    pub(crate) schema: Option<CompiledSchema>,
}

impl OpenApiValidator {
    pub(crate) fn new(mut base_paths: Vec<String>, routes: Vec<Route>) -> Self {
        base_paths.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        base_paths.dedup();
        Self { base_paths, routes }
    }

    /// Number of path templates.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Number of operations across all paths.
    pub fn operation_count(&self) -> usize {
        self.routes.iter().map(|r| r.operations.len()).sum()
    }

    /// Server base paths stripped from request paths.
    pub fn base_paths(&self) -> &[String] {
        &self.base_paths
    }

    #[cfg(test)]
    pub(crate) fn routes(&self) -> &[Route] {
        &self.routes
    }

    fn strip_base_path<'p>(&self, path: &'p str) -> &'p str {
        for base in &self.base_paths {
            if let Some(rest) = path.strip_prefix(base.as_str()) {
                if rest.is_empty() {
                    return "/";
                }
                if rest.starts_with('/') {
                    return rest;
                }
            }
        }
        path
    }

    /// Most literal segments wins; ties go to the first template declared.
    fn find_route(&self, segments: &[&str]) -> Option<(&Route, Vec<(String, String)>)> {
        let mut best: Option<(&Route, Vec<(String, String)>)> = None;
        for route in &self.routes {
            let Some(captures) = route.template.matches(segments) else {
                continue;
            };
            let better = best.as_ref().is_none_or(|(current, _)| {
                route.template.literal_count() > current.template.literal_count()
            });
            if better {
                best = Some((route, captures));
            }
        }
        best
    }
}

impl ValidationEngine for OpenApiValidator {
    fn validate(&self, subject: &CheckSubject) -> Result<ValidationOutcome, EngineError> {
        let method = Method::from_bytes(subject.method().as_bytes()).map_err(|_| {
            EngineError::MalformedSubject {
                reason: format!("invalid method token '{}'", subject.method()),
            }
        })?;

        let path = subject.path_without_query();
        if !path.starts_with('/') {
            return Err(EngineError::MalformedSubject {
                reason: format!("path '{path}' does not start with '/'"),
            });
        }

        let segments = split_segments(self.strip_base_path(path));
        let Some((route, captures)) = self.find_route(&segments) else {
            return Ok(ValidationOutcome::fail(vec![
                ViolationRecord::new("Request path not found in contract")
                    .with_reason(format!("no path in the contract matches '{path}'"))
                    .with_validation("path", "missing")
                    .with_request(subject.method(), path),
            ]));
        };

        let Some(operation) = route.operations.get(&method) else {
            return Ok(ValidationOutcome::fail(vec![
                ViolationRecord::new("Operation not found in contract")
                    .with_reason(format!(
                        "{method} is not declared for path '{}'",
                        route.template
                    ))
                    .with_validation("path", "missingOperation")
                    .with_request(subject.method(), path),
            ]));
        };

        let params = RequestParameters::new(subject, &captures);
        let mut records: Vec<ViolationRecord> = operation
            .parameters
            .iter()
            .filter_map(|p| p.check(&params, subject.method(), path))
            .collect();

        if let Some(body) = &operation.request_body {
            records.extend(check_body(body, subject, path));
        }

        debug!(
            route = %route.template,
            method = %method,
            records = records.len(),
            "Contract evaluation finished"
        );

        Ok(if records.is_empty() {
            ValidationOutcome::pass()
        } else {
            ValidationOutcome::fail(records)
        })
    }
}

fn check_body(body: &RequestBody, subject: &CheckSubject, path: &str) -> Option<ViolationRecord> {
    let record = |sub_type: &str, message: &str| {
        ViolationRecord::new(message)
            .with_validation("requestBody", sub_type)
            .with_request(subject.method(), path)
    };

    if subject.body().is_empty() {
        return body
            .required
            .then(|| record("missing", "Request body is required"));
    }

    if body.media.is_empty() {
        return None;
    }

    let Some(content_type) = subject.content_type() else {
        return Some(
            record("contentType", "Request body content type is not allowed")
                .with_reason("request body sent without a content-type header"),
        );
    };

    let Some(media) = select_media(&body.media, &content_type) else {
        return Some(
            record("contentType", "Request body content type is not allowed").with_reason(
                format!("content type '{content_type}' is not declared for this operation"),
            ),
        );
    };

    if !is_json(&content_type) {
        return None;
    }

    let document: Value = match serde_json::from_slice(subject.body()) {
        Ok(document) => document,
        Err(e) => {
            return Some(
                record("schema", "Request body does not match schema").with_schema_error(
                    SchemaViolation::new(format!("request body is not valid JSON: {e}"))
                        .with_location("body")
                        .with_field_path("$"),
                ),
            );
        }
    };

    let errors = media.schema.as_ref()?.body_violations(&document);
    if errors.is_empty() {
        return None;
    }

    let mut failed = record("schema", "Request body does not match schema");
    failed.schema_errors = errors;
    Some(failed)
}

/// Exact media type first, then `type/*`, then `*/*`.
fn select_media<'a>(media: &'a [MediaType], content_type: &str) -> Option<&'a MediaType> {
    let wildcard = content_type
        .split_once('/')
        .map(|(major, _)| format!("{major}/*"));

    media
        .iter()
        .find(|m| m.range == content_type)
        .or_else(|| {
            wildcard
                .as_deref()
                .and_then(|w| media.iter().find(|m| m.range == w))
        })
        .or_else(|| media.iter().find(|m| m.range == "*/*"))
}

fn is_json(media_type: &str) -> bool {
    media_type == "application/json" || media_type.ends_with("+json")
}
