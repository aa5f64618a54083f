//! oasgate proxy: the Envoy-facing side of the sidecar.
//!
//! - [`authz`]: the `envoy.service.auth.v3.Authorization` gRPC service
//! - [`admin`]: health, readiness, and metrics over HTTP
//! - [`ports`]: listener port configuration
//! - [`startup`]: contract loading and listener binding

pub mod admin;
pub mod authz;
pub mod error;
pub mod ports;
pub mod startup;
