//! Parameter extraction and string → JSON coercion.
//!
//! Parameters reach the sidecar as strings. Before schema validation each
//! value is coerced according to the declared schema type, so `?limit=10`
//! validates against `{"type": "integer"}`. Values that do not coerce stay
//! strings and fail the schema with a type error.

use serde_json::{Number, Value};

use super::schema::CompiledSchema;
use crate::subject::{CheckSubject, HeaderMap};
use crate::violation::ViolationRecord;

/// Where a parameter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParamLocation {
    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

/// Coercion target derived from a parameter schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ValueKind {
    String,
    Integer,
    Number,
    Boolean,
    Array(Box<ValueKind>),
}

impl ValueKind {
    /// Reads the coercion target from a schema, following local `$ref`s.
    pub(crate) fn of(schema: &Value, root: &Value) -> Self {
        let schema = follow_ref(schema, root);

        let declared = match schema.get("type") {
            Some(Value::String(t)) => Some(t.as_str()),
            Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
            _ => None,
        };

        match declared {
            Some("integer") => Self::Integer,
            Some("number") => Self::Number,
            Some("boolean") => Self::Boolean,
            Some("array") => Self::Array(Box::new(
                schema
                    .get("items")
                    .map(|items| Self::of(items, root))
                    .unwrap_or(Self::String),
            )),
            None if schema.get("items").is_some() => Self::Array(Box::new(Self::String)),
            _ => Self::String,
        }
    }
}

fn follow_ref<'a>(mut schema: &'a Value, root: &'a Value) -> &'a Value {
    for _ in 0..8 {
        let Some(target) = schema
            .get("$ref")
            .and_then(Value::as_str)
            .and_then(|r| r.strip_prefix('#'))
            .and_then(|pointer| root.pointer(pointer))
        else {
            break;
        };
        schema = target;
    }
    schema
}

/// A compiled operation parameter.
#[derive(Debug)]
pub(crate) struct Parameter {
    pub(crate) name: String,
    pub(crate) location: ParamLocation,
    pub(crate) required: bool,
    pub(crate) kind: ValueKind,
    pub(crate) schema: Option<CompiledSchema>,
}

impl Parameter {
    /// Checks one parameter, returning a record on failure.
    pub(crate) fn check(
        &self,
        request: &RequestParameters<'_>,
        method: &str,
        path: &str,
    ) -> Option<ViolationRecord> {
        let location = self.location.as_str();
        let raw = request.values(self.location, &self.name);

        if raw.is_empty() {
            if !self.required {
                return None;
            }
            return Some(
                ViolationRecord::new("Request parameter is missing")
                    .with_reason(format!(
                        "{location} parameter '{}' is required",
                        self.name
                    ))
                    .with_validation("parameter", location)
                    .with_parameter(&self.name)
                    .with_request(method, path),
            );
        }

        let schema = self.schema.as_ref()?;
        let value = coerce(&raw, &self.kind);
        let errors = schema.parameter_violations(&value, location, &self.name);
        if errors.is_empty() {
            return None;
        }

        let mut record = ViolationRecord::new(format!(
            "Invalid {location} parameter '{}'",
            self.name
        ))
        .with_validation("parameter", location)
        .with_parameter(&self.name)
        .with_request(method, path);
        record.schema_errors = errors;
        Some(record)
    }
}

/// Parameter sources of one request.
pub(crate) struct RequestParameters<'a> {
    path: &'a [(String, String)],
    query: Vec<(String, String)>,
    headers: &'a HeaderMap,
    cookies: Vec<(String, String)>,
}

impl<'a> RequestParameters<'a> {
    pub(crate) fn new(subject: &'a CheckSubject, path: &'a [(String, String)]) -> Self {
        let query = subject
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let cookies = subject
            .headers()
            .get("cookie")
            .map(parse_cookies)
            .unwrap_or_default();

        Self {
            path,
            query,
            headers: subject.headers(),
            cookies,
        }
    }

    /// Every raw value for the named parameter.
    pub(crate) fn values(&self, location: ParamLocation, name: &str) -> Vec<String> {
        let matching = |pairs: &[(String, String)]| -> Vec<String> {
            pairs
                .iter()
                .filter(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .collect()
        };

        match location {
            ParamLocation::Path => matching(self.path),
            ParamLocation::Query => matching(self.query.as_slice()),
            ParamLocation::Cookie => matching(self.cookies.as_slice()),
            ParamLocation::Header => self
                .headers
                .get(name)
                .map(|v| vec![v.to_string()])
                .unwrap_or_default(),
        }
    }
}

fn parse_cookies(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Coerces raw string values into the JSON value the schema expects.
///
/// Arrays accept repeated values or a single comma-separated value.
pub(crate) fn coerce(raw: &[String], kind: &ValueKind) -> Value {
    match kind {
        ValueKind::Array(item) => {
            let parts: Vec<&str> = match raw {
                [single] => single.split(',').map(str::trim).collect(),
                many => many.iter().map(String::as_str).collect(),
            };
            Value::Array(parts.into_iter().map(|p| coerce_scalar(p, item)).collect())
        }
        scalar => raw
            .first()
            .map(|v| coerce_scalar(v, scalar))
            .unwrap_or(Value::Null),
    }
}

fn coerce_scalar(raw: &str, kind: &ValueKind) -> Value {
    let as_string = || Value::String(raw.to_string());
    match kind {
        ValueKind::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| raw.parse::<u64>().map(Value::from))
            .unwrap_or_else(|_| as_string()),
        ValueKind::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(as_string),
        ValueKind::Boolean => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => as_string(),
        },
        // nested arrays are not expressible in a flat parameter string
        ValueKind::String | ValueKind::Array(_) => as_string(),
    }
}
