//! oasgate core: the transport-agnostic check pipeline.
//!
//! Every authorization check flows through the same stages:
//!
//! ```text
//! HttpAttributes ─► CheckSubject ─► ValidationEngine ─► Verdict ─► EncodedVerdict
//!     (proxy)        (subject)        (contract)        (decision)   (encoder)
//! ```
//!
//! The proxy crate (`oasgate-proxy`) owns the gRPC transport and maps
//! [`encoder::EncodedVerdict`] onto Envoy's `CheckResponse`. Everything here
//! is synchronous and shared read-only across concurrent checks.

pub mod config;
pub mod contract;
pub mod decision;
pub mod encoder;
pub mod engine;
pub mod lifecycle;
pub mod pipeline;
pub mod subject;
pub mod telemetry;
pub mod violation;

pub use config::{NonHttpPolicy, PipelineConfig};
pub use decision::{DENY_STATUS_CODE, Verdict, decide};
pub use encoder::{DeniedResponse, EncodedVerdict, encode};
pub use engine::{EngineError, ValidationEngine, ValidationOutcome};
pub use pipeline::CheckPipeline;
pub use subject::{CheckSubject, HeaderMap, HttpAttributes};
pub use violation::{NormalizedViolation, SchemaViolation, ViolationRecord, classify, classify_all};
