//! Prometheus metrics for the check pipeline.
//!
//! Metrics are registered into a `prometheus_client` registry owned by the
//! binary and exported on the admin port's `/metrics` endpoint.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

/// Labels for the check counter.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DecisionLabels {
    /// "allow", "deny", or "error"
    pub decision: String,
}

/// Check pipeline metrics.
#[derive(Debug)]
pub struct CheckMetrics {
    /// `oasgate_checks_total{decision}`
    pub checks_total: Family<DecisionLabels, Counter>,
    /// `oasgate_violations_total`
    pub violations_total: Counter,
    /// `oasgate_engine_errors_total`
    pub engine_errors_total: Counter,
    /// `oasgate_check_duration_ms`
    pub check_duration_ms: Histogram,
}

impl CheckMetrics {
    /// Creates and registers all metrics with the given registry.
    pub fn new(registry: &mut Registry) -> Self {
        let checks_total = Family::<DecisionLabels, Counter>::default();
        registry.register(
            "oasgate_checks",
            "Authorization checks by decision",
            checks_total.clone(),
        );

        let violations_total = Counter::default();
        registry.register(
            "oasgate_violations",
            "Contract violations reported in deny verdicts",
            violations_total.clone(),
        );

        let engine_errors_total = Counter::default();
        registry.register(
            "oasgate_engine_errors",
            "Checks that failed because the validation engine could not run",
            engine_errors_total.clone(),
        );

        // 0.05ms .. ~100ms
        let check_duration_ms = Histogram::new(exponential_buckets(0.05, 2.0, 12));
        registry.register(
            "oasgate_check_duration_ms",
            "Time spent deciding a check, in milliseconds",
            check_duration_ms.clone(),
        );

        Self {
            checks_total,
            violations_total,
            engine_errors_total,
            check_duration_ms,
        }
    }

    /// Records a completed check.
    pub fn record_decision(&self, decision: &str, violations: usize, duration_ms: f64) {
        self.checks_total
            .get_or_create(&DecisionLabels {
                decision: decision.to_string(),
            })
            .inc();
        self.violations_total.inc_by(violations as u64);
        self.check_duration_ms.observe(duration_ms);
    }

    /// Records a check that failed with an engine error.
    pub fn record_engine_error(&self, duration_ms: f64) {
        self.checks_total
            .get_or_create(&DecisionLabels {
                decision: "error".to_string(),
            })
            .inc();
        self.engine_errors_total.inc();
        self.check_duration_ms.observe(duration_ms);
    }
}
