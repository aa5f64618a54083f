//! Schema compilation and error reporting.
//!
//! Every contract schema is compiled once at startup. Schemas are embedded in
//! a wrapper that carries the contract's `components`, so local
//! `#/components/...` references resolve without a custom retriever:
//!
//! ```json
//! {"allOf": [<schema>], "components": {...}}
//! ```

use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, Validator};
use serde_json::{Value, json};

use super::{ContractDocument, ContractError, SpecVersion};
use crate::violation::SchemaViolation;

/// Compiles contract schemas with the dialect of the contract's version.
pub(crate) struct SchemaCompiler {
    draft: Draft,
    version: SpecVersion,
    components: Value,
}

impl SchemaCompiler {
    pub(crate) fn new(doc: &ContractDocument) -> Self {
        let version = doc.version();
        let mut components = doc
            .root()
            .get("components")
            .cloned()
            .unwrap_or_else(|| json!({}));
        if version == SpecVersion::V3_0 {
            rewrite_components_nullable(&mut components);
        }

        Self {
            draft: match version {
                SpecVersion::V3_0 => Draft::Draft4,
                SpecVersion::V3_1 => Draft::Draft202012,
            },
            version,
            components,
        }
    }

    /// Compiles one schema. `location` names it in build errors.
    pub(crate) fn compile(
        &self,
        schema: &Value,
        location: &str,
    ) -> Result<CompiledSchema, ContractError> {
        let mut schema = schema.clone();
        if self.version == SpecVersion::V3_0 {
            rewrite_nullable(&mut schema);
        }

        let wrapper = json!({
            "allOf": [schema],
            "components": self.components,
        });

        let validator = jsonschema::options()
            .with_draft(self.draft)
            .build(&wrapper)
            .map_err(|e| ContractError::InvalidSchema {
                location: location.to_string(),
                message: e.to_string(),
            })?;

        Ok(CompiledSchema { validator })
    }
}

/// A compiled contract schema.
pub(crate) struct CompiledSchema {
    validator: Validator,
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CompiledSchema")
    }
}

impl CompiledSchema {
    /// Schema failures for a request body, with `$.a[0].b` field paths.
    pub(crate) fn body_violations(&self, body: &Value) -> Vec<SchemaViolation> {
        self.validator
            .iter_errors(body)
            .map(|error| {
                let pointer = error.instance_path.to_string();
                let path = render_field_path(&pointer, body);
                let violation = SchemaViolation::new(error.to_string()).with_location("body");

                match &error.kind {
                    ValidationErrorKind::Required { property } => {
                        let property = property_name(property);
                        violation
                            .with_field_path(format!("{path}.{property}"))
                            .with_field_name(property)
                    }
                    _ => {
                        let violation = violation
                            .with_field_path(path)
                            .with_value(error.instance.to_string());
                        match pointer.rsplit('/').next().filter(|s| !s.is_empty()) {
                            Some(last) => violation.with_field_name(unescape(last)),
                            None => violation,
                        }
                    }
                }
            })
            .collect()
    }

    /// Schema failures for one parameter value.
    pub(crate) fn parameter_violations(
        &self,
        value: &Value,
        location: &str,
        name: &str,
    ) -> Vec<SchemaViolation> {
        self.validator
            .iter_errors(value)
            .map(|error| {
                let violation = SchemaViolation::new(error.to_string())
                    .with_location(location)
                    .with_field_name(name);
                if matches!(error.kind, ValidationErrorKind::Required { .. }) {
                    violation
                } else {
                    violation.with_value(error.instance.to_string())
                }
            })
            .collect()
    }
}

/// Renders a JSON pointer as `$.a[0].b`, using the instance to tell array
/// indices from object keys.
pub(crate) fn render_field_path(pointer: &str, root: &Value) -> String {
    let mut out = String::from("$");
    let mut current = Some(root);

    for raw in pointer.split('/').skip(1) {
        let token = unescape(raw);
        current = match current {
            Some(Value::Array(items)) => {
                out.push('[');
                out.push_str(&token);
                out.push(']');
                token.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            Some(value) => {
                out.push('.');
                out.push_str(&token);
                value.get(token.as_str())
            }
            None => {
                out.push('.');
                out.push_str(&token);
                None
            }
        };
    }

    out
}

/// Keywords whose value is a single subschema.
const SCHEMA_KEYWORDS: [&str; 10] = [
    "items",
    "additionalItems",
    "additionalProperties",
    "not",
    "contains",
    "propertyNames",
    "if",
    "then",
    "else",
    "unevaluatedProperties",
];

/// Keywords whose value is an array of subschemas.
const SCHEMA_ARRAY_KEYWORDS: [&str; 4] = ["allOf", "anyOf", "oneOf", "prefixItems"];

/// Keywords whose value maps names to subschemas.
const SCHEMA_MAP_KEYWORDS: [&str; 5] = [
    "properties",
    "patternProperties",
    "definitions",
    "$defs",
    "dependentSchemas",
];

/// Rewrites OAS 3.0 `nullable: true` into a JSON Schema type union.
///
/// Only schema positions are visited: property names, `enum` members, and
/// `example` values are left alone.
pub(crate) fn rewrite_nullable(schema: &mut Value) {
    let Value::Object(map) = schema else {
        return;
    };

    if map.get("nullable").is_some_and(Value::is_boolean)
        && map.remove("nullable") == Some(Value::Bool(true))
    {
        match map.get_mut("type") {
            Some(Value::String(t)) => {
                let t = std::mem::take(t);
                map.insert("type".to_string(), json!([t, "null"]));
            }
            Some(Value::Array(types)) => {
                if !types.iter().any(|t| t == "null") {
                    types.push(json!("null"));
                }
            }
            _ => {}
        }
        if let Some(Value::Array(options)) = map.get_mut("enum") {
            if !options.contains(&Value::Null) {
                options.push(Value::Null);
            }
        }
    }

    for keyword in SCHEMA_KEYWORDS {
        match map.get_mut(keyword) {
            // draft 4 tuple form of `items`
            Some(Value::Array(items)) => items.iter_mut().for_each(rewrite_nullable),
            Some(child) => rewrite_nullable(child),
            None => {}
        }
    }
    for keyword in SCHEMA_ARRAY_KEYWORDS {
        if let Some(Value::Array(items)) = map.get_mut(keyword) {
            items.iter_mut().for_each(rewrite_nullable);
        }
    }
    for keyword in SCHEMA_MAP_KEYWORDS {
        if let Some(Value::Object(children)) = map.get_mut(keyword) {
            children.values_mut().for_each(rewrite_nullable);
        }
    }
}

/// Applies [`rewrite_nullable`] to every schema under `components`.
pub(crate) fn rewrite_components_nullable(components: &mut Value) {
    let Value::Object(map) = components else {
        return;
    };

    if let Some(Value::Object(schemas)) = map.get_mut("schemas") {
        schemas.values_mut().for_each(rewrite_nullable);
    }
    if let Some(Value::Object(parameters)) = map.get_mut("parameters") {
        for parameter in parameters.values_mut() {
            rewrite_carried_schemas(parameter);
        }
    }
    if let Some(Value::Object(bodies)) = map.get_mut("requestBodies") {
        for body in bodies.values_mut() {
            rewrite_carried_schemas(body);
        }
    }
}

/// Parameters and request bodies carry a `schema` or `content.*.schema`.
fn rewrite_carried_schemas(holder: &mut Value) {
    if let Some(schema) = holder.get_mut("schema") {
        rewrite_nullable(schema);
    }
    if let Some(Value::Object(content)) = holder.get_mut("content") {
        for media in content.values_mut() {
            if let Some(schema) = media.get_mut("schema") {
                rewrite_nullable(schema);
            }
        }
    }
}

fn property_name(property: &Value) -> String {
    match property {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::load_contract;

    fn compiler(version: &str) -> SchemaCompiler {
        let doc = load_contract(
            json!({
                "openapi": version,
                "paths": {},
                "components": {
                    "schemas": {
                        "Name": {"type": "string", "minLength": 1}
                    }
                }
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        SchemaCompiler::new(&doc)
    }

    #[test]
    fn test_body_type_error_has_path_and_value() {
        let schema = compiler("3.0.3")
            .compile(
                &json!({"type": "object", "properties": {"name": {"type": "string"}}}),
                "test",
            )
            .unwrap();

        let errors = schema.body_violations(&json!({"name": 123}));

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].location.as_deref(), Some("body"));
        assert_eq!(errors[0].field_path.as_deref(), Some("$.name"));
        assert_eq!(errors[0].field_name.as_deref(), Some("name"));
        assert_eq!(errors[0].value.as_deref(), Some("123"));
        assert!(errors[0].reason.contains("string"));
    }

    #[test]
    fn test_required_error_names_missing_property() {
        let schema = compiler("3.0.3")
            .compile(&json!({"type": "object", "required": ["name"]}), "test")
            .unwrap();

        let errors = schema.body_violations(&json!({}));

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field_path.as_deref(), Some("$.name"));
        assert_eq!(errors[0].field_name.as_deref(), Some("name"));
        assert_eq!(errors[0].value, None);
    }

    #[test]
    fn test_component_refs_resolve() {
        let schema = compiler("3.1.0")
            .compile(
                &json!({
                    "type": "object",
                    "properties": {"name": {"$ref": "#/components/schemas/Name"}}
                }),
                "test",
            )
            .unwrap();

        assert!(schema.body_violations(&json!({"name": "ada"})).is_empty());
        assert_eq!(schema.body_violations(&json!({"name": ""})).len(), 1);
    }

    #[test]
    fn test_nullable_is_honoured_for_3_0() {
        let schema = compiler("3.0.3")
            .compile(&json!({"type": "string", "nullable": true}), "test")
            .unwrap();

        assert!(schema.body_violations(&Value::Null).is_empty());
        assert_eq!(schema.body_violations(&json!(1)).len(), 1);
    }

    #[test]
    fn test_render_field_path() {
        let body = json!({"a": [{"b": 1}], "0": {"c": true}});
        assert_eq!(render_field_path("", &body), "$");
        assert_eq!(render_field_path("/a/0/b", &body), "$.a[0].b");
        assert_eq!(render_field_path("/0/c", &body), "$.0.c");
    }

    #[test]
    fn test_rewrite_nullable_enum() {
        let mut schema = json!({"type": "string", "enum": ["a"], "nullable": true});
        rewrite_nullable(&mut schema);
        assert_eq!(schema, json!({"type": ["string", "null"], "enum": ["a", null]}));
    }

    #[test]
    fn test_property_named_nullable_is_kept() {
        let schema = compiler("3.0.3")
            .compile(
                &json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {"nullable": {"type": "boolean"}}
                }),
                "test",
            )
            .unwrap();

        assert!(schema.body_violations(&json!({"nullable": true})).is_empty());
        assert_eq!(schema.body_violations(&json!({"nullable": "yes"})).len(), 1);
    }

    #[test]
    fn test_rewrite_nullable_visits_only_schema_positions() {
        let mut schema = json!({
            "type": "object",
            "properties": {
                "nullable": {"type": "boolean"},
                "tags": {"type": "array", "items": {"type": "string", "nullable": true}}
            },
            "example": {"nullable": true},
            "anyOf": [{"type": "integer", "nullable": true}]
        });
        rewrite_nullable(&mut schema);

        assert_eq!(schema["properties"]["nullable"], json!({"type": "boolean"}));
        assert_eq!(schema["properties"]["tags"]["items"]["type"], json!(["string", "null"]));
        assert_eq!(schema["example"], json!({"nullable": true}));
        assert_eq!(schema["anyOf"][0]["type"], json!(["integer", "null"]));
    }

    #[test]
    fn test_component_schemas_are_rewritten() {
        let mut components = json!({
            "schemas": {
                "Nickname": {"type": "string", "nullable": true},
                "Flags": {"type": "object", "properties": {"nullable": {"type": "boolean"}}}
            },
            "parameters": {
                "Cursor": {"name": "cursor", "in": "query", "schema": {"type": "string", "nullable": true}}
            }
        });
        rewrite_components_nullable(&mut components);

        assert_eq!(components["schemas"]["Nickname"]["type"], json!(["string", "null"]));
        assert_eq!(
            components["schemas"]["Flags"]["properties"]["nullable"],
            json!({"type": "boolean"})
        );
        assert_eq!(
            components["parameters"]["Cursor"]["schema"]["type"],
            json!(["string", "null"])
        );
    }
}
