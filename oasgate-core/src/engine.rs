//! Validation engine seam.
//!
//! The decision assembler only knows this trait. The shipped implementation
//! is [`crate::contract::OpenApiValidator`]; tests substitute their own.

use thiserror::Error;

use crate::subject::CheckSubject;
use crate::violation::ViolationRecord;

/// Result of one successful engine invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Whether the request conforms.
    pub ok: bool,
    /// Violations in engine order. May be non-empty even when `ok` is true
    /// (advisory output), in which case it is ignored.
    pub violations: Vec<ViolationRecord>,
}

impl ValidationOutcome {
    /// A conforming outcome with no violations.
    pub fn pass() -> Self {
        Self {
            ok: true,
            violations: Vec::new(),
        }
    }

    /// A failing outcome.
    pub fn fail(violations: Vec<ViolationRecord>) -> Self {
        Self {
            ok: false,
            violations,
        }
    }
}

/// The engine could not be invoked at all.
///
/// This is a pipeline failure, distinct from a failed validation. Callers must
/// not turn it into an allow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The subject is not something the engine can evaluate.
    #[error("malformed check subject: {reason}")]
    MalformedSubject { reason: String },

    /// The engine failed internally.
    #[error("validation engine failure: {0}")]
    Internal(String),
}

/// A loaded, read-only contract model that can validate subjects.
///
/// Implementations are shared across concurrent checks for the lifetime of
/// the process and must not mutate state on the validation path.
pub trait ValidationEngine: Send + Sync {
    /// Validates one subject.
    fn validate(&self, subject: &CheckSubject) -> Result<ValidationOutcome, EngineError>;
}

impl<T: ValidationEngine + ?Sized> ValidationEngine for std::sync::Arc<T> {
    fn validate(&self, subject: &CheckSubject) -> Result<ValidationOutcome, EngineError> {
        (**self).validate(subject)
    }
}
