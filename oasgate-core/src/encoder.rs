//! Verdict encoding: verdict → proxy-consumable response parts.
//!
//! The encoder is transport-neutral. It produces an [`EncodedVerdict`] that
//! the proxy crate maps onto its wire types.
//!
//! # Deny Body
//!
//! ```json
//! {
//!   "error": "OAS_VALIDATION_FAILED",
//!   "message": "Request does not conform to OpenAPI specification",
//!   "details": [{"field": "$.name", "location": "body", "message": "..."}]
//! }
//! ```

use serde::Serialize;
use tracing::{error, info};

use crate::decision::Verdict;
use crate::violation::NormalizedViolation;

/// Machine-readable error code in every deny body.
pub const ERROR_CODE: &str = "OAS_VALIDATION_FAILED";

/// Human-readable summary in every deny body.
pub const ERROR_MESSAGE: &str = "Request does not conform to OpenAPI specification";

/// Body sent when the deny body cannot be serialized.
pub const FALLBACK_BODY: &str =
    r#"{"error":"OAS_VALIDATION_FAILED","message":"Request validation failed"}"#;

/// Content type of every deny body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// JSON document returned to the client on denial.
#[derive(Debug, Serialize)]
pub struct DenyBody<'a> {
    pub error: &'static str,
    pub message: &'static str,
    pub details: &'a [NormalizedViolation],
}

impl<'a> DenyBody<'a> {
    /// Wraps a violation list in the standard envelope.
    pub fn new(details: &'a [NormalizedViolation]) -> Self {
        Self {
            error: ERROR_CODE,
            message: ERROR_MESSAGE,
            details,
        }
    }
}

/// Denied-response parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeniedResponse {
    /// HTTP status for the denied call.
    pub status_code: u16,
    /// Response headers, in order.
    pub headers: Vec<(String, String)>,
    /// Serialized JSON body.
    pub body: String,
}

/// Encoded verdict, ready to be mapped onto the proxy protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedVerdict {
    /// Permit: no body, no extra headers.
    Allow,
    /// Deny with an HTTP status, headers, and JSON body.
    Deny(DeniedResponse),
}

impl EncodedVerdict {
    /// Returns `true` for [`EncodedVerdict::Allow`].
    pub fn is_allow(&self) -> bool {
        matches!(self, EncodedVerdict::Allow)
    }
}

/// Encodes a verdict and logs the decision.
///
/// `method` and `path` are only used for the decision log record.
pub fn encode(verdict: &Verdict, method: &str, path: &str) -> EncodedVerdict {
    encode_with(verdict, method, path, |body| serde_json::to_string(body))
}

pub(crate) fn encode_with<F>(
    verdict: &Verdict,
    method: &str,
    path: &str,
    serialize: F,
) -> EncodedVerdict
where
    F: FnOnce(&DenyBody<'_>) -> Result<String, serde_json::Error>,
{
    match verdict {
        Verdict::Allow => {
            info!(method = %method, path = %path, decision = "allow", violations = 0, "Check allowed");
            EncodedVerdict::Allow
        }
        Verdict::Deny {
            status_code,
            violations,
        } => {
            let body = match serialize(&DenyBody::new(violations)) {
                Ok(json) => json,
                Err(e) => {
                    error!(error = %e, "Failed to serialize deny body, using fallback");
                    FALLBACK_BODY.to_string()
                }
            };

            info!(
                method = %method,
                path = %path,
                decision = "deny",
                status_code = *status_code,
                violations = violations.len(),
                "Check rejected"
            );

            EncodedVerdict::Deny(DeniedResponse {
                status_code: *status_code,
                headers: vec![("content-type".to_string(), JSON_CONTENT_TYPE.to_string())],
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn deny(violations: Vec<NormalizedViolation>) -> Verdict {
        Verdict::deny(violations)
    }

    #[test]
    fn test_allow_has_no_payload() {
        assert_eq!(encode(&Verdict::Allow, "GET", "/"), EncodedVerdict::Allow);
    }

    #[test]
    fn test_deny_body_shape() {
        let verdict = deny(vec![
            NormalizedViolation::new("123 is not of type \"string\"")
                .with_field("$.name")
                .with_location("body"),
            NormalizedViolation::new("path not found").with_field("path.missing"),
        ]);

        let EncodedVerdict::Deny(resp) = encode(&verdict, "POST", "/users") else {
            panic!("expected deny");
        };

        assert_eq!(resp.status_code, 400);
        assert_eq!(
            resp.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );

        let json: Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(json["error"], "OAS_VALIDATION_FAILED");
        assert_eq!(
            json["message"],
            "Request does not conform to OpenAPI specification"
        );
        assert_eq!(json["details"].as_array().unwrap().len(), 2);
        assert_eq!(json["details"][0]["field"], "$.name");
        assert_eq!(json["details"][0]["location"], "body");
        assert!(json["details"][1].get("location").is_none());
        assert!(json["details"][1].get("value").is_none());
    }

    #[test]
    fn test_serialization_failure_uses_fallback() {
        let verdict = deny(vec![NormalizedViolation::new("x")]);

        let encoded = encode_with(&verdict, "GET", "/", |_| {
            Err(serde_json::from_str::<Value>("{").unwrap_err())
        });

        let EncodedVerdict::Deny(resp) = encoded else {
            panic!("expected deny");
        };
        assert_eq!(resp.body, FALLBACK_BODY);
        assert_eq!(resp.status_code, 400);

        let json: Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(json["error"], ERROR_CODE);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let verdict = deny(vec![
            NormalizedViolation::new("a").with_field("f"),
            NormalizedViolation::new("b").with_location("query"),
        ]);
        assert_eq!(encode(&verdict, "GET", "/"), encode(&verdict, "GET", "/"));
    }
}
