//! Violation records and their normalization.
//!
//! The validation engine reports failures in two very different shapes:
//!
//! - **Schema** records bundle one or more field-level schema failures
//!   (wrong type, missing property, pattern mismatch, ...). Each sub-error
//!   knows its field and where in the request it lives.
//! - **Structural** records describe protocol-shape problems: no matching
//!   path, unknown operation, missing parameter, unexpected content type.
//!   They carry a generic message, an optional specific reason, and a
//!   classification label.
//!
//! [`classify`] reconciles both shapes into [`NormalizedViolation`], the only
//! violation type that leaves the process.

use serde::Serialize;

/// Message used when an engine record provides no text at all.
pub const FALLBACK_MESSAGE: &str = "request does not conform to the contract";

/// One field-level schema failure inside a [`ViolationRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Why the value failed.
    pub reason: String,
    /// Where the value lives: `body`, `query`, `header`, `path`, `cookie`.
    pub location: Option<String>,
    /// Plain field name (e.g. `name`).
    pub field_name: Option<String>,
    /// JSON-path style reference (e.g. `$.user.name`).
    pub field_path: Option<String>,
    /// Offending value, rendered compactly.
    pub value: Option<String>,
}

impl SchemaViolation {
    /// Creates a sub-error with a reason and nothing else.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Self::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = Some(name.into());
        self
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Engine-native violation record.
///
/// Empty strings in optional fields are treated the same as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationRecord {
    /// Generic, human-readable message.
    pub message: String,
    /// More specific explanation, preferred over `message` when present.
    pub reason: Option<String>,
    /// Broad classification (e.g. `path`, `parameter`, `requestBody`).
    pub validation_type: Option<String>,
    /// Narrow classification (e.g. `missing`, `contentType`).
    pub validation_sub_type: Option<String>,
    /// Name of the offending parameter, if any.
    pub parameter_name: Option<String>,
    /// Echo of the request method.
    pub request_method: Option<String>,
    /// Echo of the request path (no query string).
    pub request_path: Option<String>,
    /// Field-level schema failures. Non-empty makes this a schema record.
    pub schema_errors: Vec<SchemaViolation>,
}

impl ViolationRecord {
    /// Creates a record with a generic message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the type and sub-type labels.
    pub fn with_validation(
        mut self,
        validation_type: impl Into<String>,
        sub_type: impl Into<String>,
    ) -> Self {
        self.validation_type = Some(validation_type.into());
        self.validation_sub_type = Some(sub_type.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>) -> Self {
        self.parameter_name = Some(name.into());
        self
    }

    /// Echoes the request line this record refers to.
    pub fn with_request(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.request_method = Some(method.into());
        self.request_path = Some(path.into());
        self
    }

    pub fn with_schema_error(mut self, error: SchemaViolation) -> Self {
        self.schema_errors.push(error);
        self
    }

    /// Which of the two record shapes this is.
    pub fn shape(&self) -> RecordShape<'_> {
        if self.schema_errors.is_empty() {
            RecordShape::Structural
        } else {
            RecordShape::Schema(&self.schema_errors)
        }
    }
}

/// The two shapes an engine record can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape<'a> {
    /// One or more field-level schema failures.
    Schema(&'a [SchemaViolation]),
    /// A protocol-shape failure with no schema detail.
    Structural,
}

/// A violation in the stable, client-facing taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedViolation {
    /// Offending field, parameter, or classification label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Where the violation was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Human-readable reason. Never empty.
    pub message: String,
    /// Offending value, when known and echoing is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl NormalizedViolation {
    /// Creates a violation with only a message.
    ///
    /// An empty message is replaced by [`FALLBACK_MESSAGE`].
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            field: None,
            location: None,
            message: if message.trim().is_empty() {
                FALLBACK_MESSAGE.to_string()
            } else {
                message
            },
            value: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Normalizes one engine record.
///
/// Schema records fan out into one entry per sub-error; structural records
/// always produce exactly one entry.
pub fn classify(record: &ViolationRecord) -> Vec<NormalizedViolation> {
    match record.shape() {
        RecordShape::Schema(sub_errors) => sub_errors
            .iter()
            .map(|sub| classify_schema(record, sub))
            .collect(),
        RecordShape::Structural => vec![classify_structural(record)],
    }
}

/// Normalizes every record, preserving engine order.
pub fn classify_all(records: &[ViolationRecord]) -> Vec<NormalizedViolation> {
    records.iter().flat_map(classify).collect()
}

fn classify_schema(record: &ViolationRecord, sub: &SchemaViolation) -> NormalizedViolation {
    let message = present(Some(&sub.reason))
        .or_else(|| present(record.reason.as_ref()))
        .unwrap_or(&record.message);

    NormalizedViolation {
        field: present(sub.field_path.as_ref())
            .or_else(|| present(sub.field_name.as_ref()))
            .map(str::to_string),
        location: present(sub.location.as_ref()).map(str::to_string),
        value: present(sub.value.as_ref()).map(str::to_string),
        ..NormalizedViolation::new(message)
    }
}

fn classify_structural(record: &ViolationRecord) -> NormalizedViolation {
    let message = present(record.reason.as_ref()).unwrap_or(&record.message);

    let validation_type = present(record.validation_type.as_ref());
    let sub_type = present(record.validation_sub_type.as_ref());
    let field = match (present(record.parameter_name.as_ref()), validation_type, sub_type) {
        (Some(parameter), _, _) => Some(parameter.to_string()),
        (None, Some(vt), Some(st)) => Some(format!("{vt}.{st}")),
        (None, Some(vt), None) => Some(vt.to_string()),
        (None, None, _) => None,
    };

    let location = match (
        present(record.request_method.as_ref()),
        present(record.request_path.as_ref()),
    ) {
        (Some(method), Some(path)) => Some(format!("{method} {path}")),
        _ => None,
    };

    NormalizedViolation {
        field,
        location,
        ..NormalizedViolation::new(message)
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}
