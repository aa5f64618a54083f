//! The check pipeline: adapt → decide → classify → encode.
//!
//! A [`CheckPipeline`] is built once at startup around the loaded validation
//! engine and shared by every concurrent check. It holds no per-check state.

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::config::{NonHttpPolicy, PipelineConfig};
use crate::decision::{Verdict, decide};
use crate::encoder::{EncodedVerdict, encode};
use crate::engine::{EngineError, ValidationEngine};
use crate::subject::{CheckSubject, HttpAttributes};
use crate::telemetry::CheckMetrics;
use crate::violation::NormalizedViolation;

/// Shared, read-only check pipeline.
pub struct CheckPipeline {
    engine: Arc<dyn ValidationEngine>,
    config: PipelineConfig,
    metrics: Option<Arc<CheckMetrics>>,
}

impl CheckPipeline {
    /// Creates a pipeline around a loaded engine.
    pub fn new(engine: Arc<dyn ValidationEngine>, config: PipelineConfig) -> Self {
        Self {
            engine,
            config,
            metrics: None,
        }
    }

    /// Attaches Prometheus metrics.
    pub fn with_metrics(mut self, metrics: Arc<CheckMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs one check.
    ///
    /// `attributes` is `None` for checks that are not HTTP requests.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the validation engine cannot be invoked.
    /// The caller's transport decides whether that fails open or closed.
    pub fn check<A>(&self, attributes: Option<&A>) -> Result<EncodedVerdict, EngineError>
    where
        A: HttpAttributes + ?Sized,
    {
        let start = Instant::now();

        let Some(subject) = CheckSubject::adapt(attributes) else {
            return Ok(self.non_http(start));
        };

        info!(
            method = %subject.method(),
            path = %subject.path(),
            host = %subject.host(),
            "Check received"
        );

        let verdict = match decide(&subject, self.engine.as_ref()) {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(
                    method = %subject.method(),
                    path = %subject.path(),
                    error = %e,
                    "Validation engine could not evaluate request"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_engine_error(elapsed_ms(start));
                }
                return Err(e);
            }
        };

        let verdict = self.redact(verdict);
        let encoded = encode(&verdict, subject.method(), subject.path());
        self.record(&verdict, start);
        Ok(encoded)
    }

    fn non_http(&self, start: Instant) -> EncodedVerdict {
        let verdict = match self.config.non_http_policy {
            NonHttpPolicy::Allow => {
                info!(
                    decision = "allow",
                    violations = 0,
                    "Non-HTTP check allowed without validation"
                );
                self.record(&Verdict::Allow, start);
                return EncodedVerdict::Allow;
            }
            NonHttpPolicy::Deny => Verdict::deny(vec![
                NormalizedViolation::new("check request carries no HTTP attributes")
                    .with_field("request.protocol"),
            ]),
        };

        let encoded = encode(&verdict, "-", "-");
        self.record(&verdict, start);
        encoded
    }

    fn redact(&self, verdict: Verdict) -> Verdict {
        if self.config.include_values {
            return verdict;
        }
        match verdict {
            Verdict::Allow => Verdict::Allow,
            Verdict::Deny {
                status_code,
                mut violations,
            } => {
                for v in &mut violations {
                    v.value = None;
                }
                Verdict::Deny {
                    status_code,
                    violations,
                }
            }
        }
    }

    fn record(&self, verdict: &Verdict, start: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(verdict.label(), verdict.violation_count(), elapsed_ms(start));
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ValidationOutcome;
    use crate::violation::{SchemaViolation, ViolationRecord};
    use prometheus_client::registry::Registry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEngine {
        calls: AtomicUsize,
        outcome: ValidationOutcome,
    }

    impl ValidationEngine for CountingEngine {
        fn validate(&self, _: &CheckSubject) -> Result<ValidationOutcome, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome.clone())
        }
    }

    struct Attrs;

    impl HttpAttributes for Attrs {
        fn method(&self) -> &str {
            "POST"
        }
        fn path(&self) -> &str {
            "/users"
        }
        fn host(&self) -> &str {
            "api.example.com"
        }
        fn header_pairs(&self) -> Vec<(String, String)> {
            Vec::new()
        }
        fn body(&self) -> &[u8] {
            b"{\"name\":123}"
        }
    }

    fn failing_outcome() -> ValidationOutcome {
        ValidationOutcome::fail(vec![ViolationRecord::new("body failed").with_schema_error(
            SchemaViolation::new("123 is not of type \"string\"")
                .with_location("body")
                .with_field_path("$.name")
                .with_value("123"),
        )])
    }

    fn pipeline(outcome: ValidationOutcome, config: PipelineConfig) -> (CheckPipeline, Arc<CountingEngine>) {
        let engine = Arc::new(CountingEngine {
            calls: AtomicUsize::new(0),
            outcome,
        });
        (CheckPipeline::new(engine.clone(), config), engine)
    }

    #[test]
    fn test_non_http_allows_without_invoking_engine() {
        let (pipeline, engine) = pipeline(failing_outcome(), PipelineConfig::default());

        let encoded = pipeline.check::<Attrs>(None).unwrap();

        assert!(encoded.is_allow());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn captured_logs(run: impl FnOnce()) -> Vec<serde_json::Value> {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, run);

        let raw = buffer.0.lock().unwrap().clone();
        String::from_utf8(raw)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_non_http_allow_logs_decision_fields() {
        let (pipeline, _) = pipeline(ValidationOutcome::pass(), PipelineConfig::default());

        let logs = captured_logs(|| {
            pipeline.check::<Attrs>(None).unwrap();
        });

        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["level"], "INFO");
        assert_eq!(logs[0]["fields"]["decision"], "allow");
        assert_eq!(logs[0]["fields"]["violations"], 0);
    }

    #[test]
    fn test_non_http_deny_policy() {
        let config = PipelineConfig {
            non_http_policy: NonHttpPolicy::Deny,
            ..PipelineConfig::default()
        };
        let (pipeline, engine) = pipeline(ValidationOutcome::pass(), config);

        let EncodedVerdict::Deny(resp) = pipeline.check::<Attrs>(None).unwrap() else {
            panic!("expected deny");
        };

        assert_eq!(resp.status_code, 400);
        assert!(resp.body.contains("request.protocol"));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_values_are_stripped_by_default() {
        let (pipeline, _) = pipeline(failing_outcome(), PipelineConfig::default());

        let EncodedVerdict::Deny(resp) = pipeline.check(Some(&Attrs)).unwrap() else {
            panic!("expected deny");
        };

        let json: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
        assert!(json["details"][0].get("value").is_none());
        assert_eq!(json["details"][0]["field"], "$.name");
    }

    #[test]
    fn test_values_are_echoed_when_enabled() {
        let config = PipelineConfig {
            include_values: true,
            ..PipelineConfig::default()
        };
        let (pipeline, _) = pipeline(failing_outcome(), config);

        let EncodedVerdict::Deny(resp) = pipeline.check(Some(&Attrs)).unwrap() else {
            panic!("expected deny");
        };

        let json: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(json["details"][0]["value"], "123");
    }

    #[test]
    fn test_metrics_are_recorded() {
        let mut registry = Registry::default();
        let metrics = Arc::new(CheckMetrics::new(&mut registry));
        let (pipeline, _) = pipeline(failing_outcome(), PipelineConfig::default());
        let pipeline = pipeline.with_metrics(metrics);

        pipeline.check(Some(&Attrs)).unwrap();
        pipeline.check::<Attrs>(None).unwrap();

        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &registry).unwrap();
        assert!(buffer.contains("oasgate_checks_total{decision=\"deny\"} 1"));
        assert!(buffer.contains("oasgate_checks_total{decision=\"allow\"} 1"));
        assert!(buffer.contains("oasgate_violations_total 1"));
    }
}
