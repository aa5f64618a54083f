//! Contract document → compiled validation model.

use http::Method;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use url::Url;

use super::params::{ParamLocation, Parameter, ValueKind};
use super::path::PathTemplate;
use super::schema::SchemaCompiler;
use super::validator::{MediaType, OpenApiValidator, Operation, RequestBody, Route};
use super::{ContractDocument, ContractError};

/// Longest `$ref` chain followed before giving up.
const MAX_REF_DEPTH: usize = 16;

/// Header parameters OpenAPI says to ignore.
const IGNORED_HEADER_PARAMS: [&str; 3] = ["accept", "content-type", "authorization"];

fn operation_methods() -> [(&'static str, Method); 8] {
    [
        ("get", Method::GET),
        ("put", Method::PUT),
        ("post", Method::POST),
        ("delete", Method::DELETE),
        ("options", Method::OPTIONS),
        ("head", Method::HEAD),
        ("patch", Method::PATCH),
        ("trace", Method::TRACE),
    ]
}

/// Builds the validation model from a loaded contract.
///
/// # Errors
///
/// Fails on unresolvable references, unusable path templates or parameters,
/// and schemas that do not compile.
pub fn build_queryable_model(doc: ContractDocument) -> Result<OpenApiValidator, ContractError> {
    let root = doc.root();
    let compiler = SchemaCompiler::new(&doc);

    let paths = root
        .get("paths")
        .and_then(Value::as_object)
        .ok_or(ContractError::MissingPaths)?;

    let mut routes = Vec::with_capacity(paths.len());
    for (raw_path, item) in paths {
        let template =
            PathTemplate::parse(raw_path).map_err(|reason| ContractError::InvalidOperation {
                path: raw_path.clone(),
                method: "*".to_string(),
                reason,
            })?;
        let item = resolve(root, item)?;

        let ctx = OperationContext {
            root,
            compiler: &compiler,
            path: raw_path,
        };

        let mut operations = HashMap::new();
        for (key, method) in operation_methods() {
            let Some(op) = item.get(key) else {
                continue;
            };
            let op = resolve(root, op)?;
            let operation = ctx.build_operation(&method, item.get("parameters"), op)?;
            operations.insert(method, operation);
        }

        debug!(path = %template, operations = operations.len(), "Compiled path");
        routes.push(Route {
            template,
            operations,
        });
    }

    let base_paths = server_base_paths(root);
    let model = OpenApiValidator::new(base_paths, routes);

    info!(
        version = %doc.declared_version(),
        routes = model.route_count(),
        operations = model.operation_count(),
        base_paths = ?model.base_paths(),
        "Contract model built"
    );

    Ok(model)
}

/// Follows local `$ref`s until a non-reference value is reached.
pub(crate) fn resolve<'a>(root: &'a Value, mut value: &'a Value) -> Result<&'a Value, ContractError> {
    for _ in 0..MAX_REF_DEPTH {
        let Some(reference) = value.get("$ref").and_then(Value::as_str) else {
            return Ok(value);
        };
        value = reference
            .strip_prefix('#')
            .and_then(|pointer| root.pointer(pointer))
            .ok_or_else(|| ContractError::UnresolvedRef {
                reference: reference.to_string(),
            })?;
    }

    Err(ContractError::UnresolvedRef {
        reference: format!("reference chain longer than {MAX_REF_DEPTH}"),
    })
}

struct OperationContext<'a> {
    root: &'a Value,
    compiler: &'a SchemaCompiler,
    path: &'a str,
}

impl OperationContext<'_> {
    fn invalid(&self, method: &Method, reason: impl Into<String>) -> ContractError {
        ContractError::InvalidOperation {
            path: self.path.to_string(),
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    fn build_operation(
        &self,
        method: &Method,
        shared: Option<&Value>,
        op: &Value,
    ) -> Result<Operation, ContractError> {
        let parameters = self.build_parameters(method, shared, op.get("parameters"))?;
        let request_body = match op.get("requestBody") {
            Some(body) => Some(self.build_request_body(method, body)?),
            None => None,
        };

        Ok(Operation {
            parameters,
            request_body,
        })
    }

    /// Path-level parameters first, overridden by operation-level ones with
    /// the same `(name, in)`.
    fn build_parameters(
        &self,
        method: &Method,
        shared: Option<&Value>,
        own: Option<&Value>,
    ) -> Result<Vec<Parameter>, ContractError> {
        let mut merged: Vec<(&str, ParamLocation, &Value)> = Vec::new();

        for list in [shared, own].into_iter().flatten() {
            let items = list
                .as_array()
                .ok_or_else(|| self.invalid(method, "'parameters' must be an array"))?;

            for item in items {
                let def = resolve(self.root, item)?;
                let name = def
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| self.invalid(method, "parameter without a name"))?;
                let location = def
                    .get("in")
                    .and_then(Value::as_str)
                    .and_then(ParamLocation::parse)
                    .ok_or_else(|| {
                        self.invalid(method, format!("parameter '{name}' has no valid 'in'"))
                    })?;

                match merged
                    .iter_mut()
                    .find(|(n, l, _)| *n == name && *l == location)
                {
                    Some(existing) => existing.2 = def,
                    None => merged.push((name, location, def)),
                }
            }
        }

        merged
            .into_iter()
            .filter(|(name, location, _)| {
                *location != ParamLocation::Header
                    || !IGNORED_HEADER_PARAMS
                        .iter()
                        .any(|h| h.eq_ignore_ascii_case(name))
            })
            .map(|(name, location, def)| self.build_parameter(method, name, location, def))
            .collect()
    }

    fn build_parameter(
        &self,
        method: &Method,
        name: &str,
        location: ParamLocation,
        def: &Value,
    ) -> Result<Parameter, ContractError> {
        let required = location == ParamLocation::Path
            || def.get("required").and_then(Value::as_bool).unwrap_or(false);

        let schema_def = def.get("schema").or_else(|| {
            def.get("content")
                .and_then(Value::as_object)
                .and_then(|content| content.values().next())
                .and_then(|media| media.get("schema"))
        });

        let kind = schema_def
            .map(|s| ValueKind::of(s, self.root))
            .unwrap_or(ValueKind::String);

        let schema = match schema_def {
            Some(s) => Some(self.compiler.compile(
                s,
                &format!("{method} {} {} parameter '{name}'", self.path, location.as_str()),
            )?),
            None => None,
        };

        Ok(Parameter {
            name: name.to_string(),
            location,
            required,
            kind,
            schema,
        })
    }

    fn build_request_body(&self, method: &Method, body: &Value) -> Result<RequestBody, ContractError> {
        let body = resolve(self.root, body)?;
        let required = body.get("required").and_then(Value::as_bool).unwrap_or(false);

        let mut media = Vec::new();
        if let Some(content) = body.get("content").and_then(Value::as_object) {
            for (range, def) in content {
                let range = range
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase();
                let schema = match def.get("schema") {
                    Some(s) => Some(self.compiler.compile(
                        s,
                        &format!("{method} {} requestBody {range}", self.path),
                    )?),
                    None => None,
                };
                media.push(MediaType { range, schema });
            }
        }

        Ok(RequestBody { required, media })
    }
}

/// Path components of `servers[].url`, with server variables expanded to
/// their defaults.
fn server_base_paths(root: &Value) -> Vec<String> {
    let Some(servers) = root.get("servers").and_then(Value::as_array) else {
        return Vec::new();
    };
    let origin = match Url::parse("http://localhost/") {
        Ok(origin) => origin,
        Err(_) => return Vec::new(),
    };

    let mut paths = Vec::new();
    for server in servers {
        let Some(raw) = server.get("url").and_then(Value::as_str) else {
            continue;
        };
        let expanded = expand_variables(raw, server.get("variables").and_then(Value::as_object));

        match origin.join(&expanded) {
            Ok(url) => {
                let path = url.path().trim_end_matches('/');
                if !path.is_empty() {
                    paths.push(path.to_string());
                }
            }
            Err(e) => warn!(url = %raw, error = %e, "Ignoring unparseable server url"),
        }
    }
    paths
}

fn expand_variables(url: &str, variables: Option<&Map<String, Value>>) -> String {
    let mut out = url.to_string();
    for (name, var) in variables.into_iter().flatten() {
        if let Some(default) = var.get("default").and_then(Value::as_str) {
            out = out.replace(&format!("{{{name}}}"), default);
        }
    }
    out
}
