//! Decision assembly: engine outcome → verdict.

use tracing::{info, warn};

use crate::engine::{EngineError, ValidationEngine};
use crate::subject::CheckSubject;
use crate::violation::{NormalizedViolation, ViolationRecord, classify_all};

/// HTTP status returned to the client for every denied request.
///
/// Not derived per violation: every denial means the client sent a request
/// that does not conform to the contract.
pub const DENY_STATUS_CODE: u16 = 400;

/// The outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Let the request through.
    Allow,
    /// Reject the request and explain why.
    Deny {
        /// HTTP status for the denied call.
        status_code: u16,
        /// Every violation, in engine order.
        violations: Vec<NormalizedViolation>,
    },
}

impl Verdict {
    /// Builds a deny verdict with the fixed status code.
    pub fn deny(violations: Vec<NormalizedViolation>) -> Self {
        Verdict::Deny {
            status_code: DENY_STATUS_CODE,
            violations,
        }
    }

    /// Returns `true` for [`Verdict::Allow`].
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    /// Number of violations carried (zero for allow).
    pub fn violation_count(&self) -> usize {
        match self {
            Verdict::Allow => 0,
            Verdict::Deny { violations, .. } => violations.len(),
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Deny { .. } => "deny",
        }
    }
}

/// Runs a subject through the engine and produces exactly one verdict.
///
/// # Errors
///
/// Returns the engine's [`EngineError`] unchanged when the engine cannot be
/// invoked. That is never folded into an allow or a deny.
pub fn decide(
    subject: &CheckSubject,
    engine: &dyn ValidationEngine,
) -> Result<Verdict, EngineError> {
    let outcome = engine.validate(subject)?;

    if outcome.ok {
        return Ok(Verdict::Allow);
    }

    let records = if outcome.violations.is_empty() {
        warn!(
            method = %subject.method(),
            path = %subject.path(),
            "Engine rejected request without reporting violations"
        );
        vec![
            ViolationRecord::new("Request validation failed")
                .with_validation("request", "unknown")
                .with_request(subject.method(), subject.path_without_query()),
        ]
    } else {
        outcome.violations
    };

    let violations = classify_all(&records);
    for v in &violations {
        info!(
            field = v.field.as_deref().unwrap_or("-"),
            location = v.location.as_deref().unwrap_or("-"),
            reason = %v.message,
            "Validation failure"
        );
    }

    Ok(Verdict::deny(violations))
}
