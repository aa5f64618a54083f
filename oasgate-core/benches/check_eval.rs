//! Check pipeline benchmark.
//!
//! - `check/allow`: conforming request with a path parameter
//! - `check/deny_body`: JSON body failing two schema constraints
//! - `check/deny_path`: undeclared path
//!
//! ```bash
//! cargo bench -p oasgate-core --bench check_eval
//! ```

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use oasgate_core::contract::{build_queryable_model, load_contract};
use oasgate_core::{CheckPipeline, HttpAttributes, PipelineConfig};

const CONTRACT: &str = include_str!("../tests/fixtures/users.yaml");

struct BenchRequest {
    method: &'static str,
    path: &'static str,
    headers: Vec<(String, String)>,
    body: &'static [u8],
}

impl HttpAttributes for BenchRequest {
    fn method(&self) -> &str {
        self.method
    }
    fn path(&self) -> &str {
        self.path
    }
    fn host(&self) -> &str {
        "api.example.com"
    }
    fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers.clone()
    }
    fn body(&self) -> &[u8] {
        self.body
    }
}

fn json_headers() -> Vec<(String, String)> {
    vec![
        ("host".to_string(), "api.example.com".to_string()),
        ("content-type".to_string(), "application/json".to_string()),
    ]
}

fn bench_check(c: &mut Criterion) {
    let doc = load_contract(CONTRACT.as_bytes()).expect("fixture contract should load");
    let engine = build_queryable_model(doc).expect("fixture contract should compile");
    let pipeline = CheckPipeline::new(Arc::new(engine), PipelineConfig::default());

    let allow = BenchRequest {
        method: "GET",
        path: "/users/42",
        headers: json_headers(),
        body: b"",
    };
    let deny_body = BenchRequest {
        method: "POST",
        path: "/users",
        headers: json_headers(),
        body: br#"{"name": 123, "age": -4}"#,
    };
    let deny_path = BenchRequest {
        method: "GET",
        path: "/nonexistent",
        headers: json_headers(),
        body: b"",
    };

    let mut group = c.benchmark_group("check");
    group.bench_function("allow", |b| {
        b.iter(|| pipeline.check(Some(black_box(&allow))))
    });
    group.bench_function("deny_body", |b| {
        b.iter(|| pipeline.check(Some(black_box(&deny_body))))
    });
    group.bench_function("deny_path", |b| {
        b.iter(|| pipeline.check(Some(black_box(&deny_path))))
    });
    group.finish();
}

criterion_group!(benches, bench_check);
criterion_main!(benches);
