//! Listener ports.
//!
//! | Port | Name | Purpose |
//! |------|------|---------|
//! | 9000 | gRPC | `ext_authz` Check calls from Envoy |
//! | 9001 | Admin | Health checks, metrics |
//!
//! # Environment Variables
//!
//! - `OASGATE_GRPC_PORT` (default: 9000)
//! - `OASGATE_ADMIN_PORT` (default: 9001)

use tracing::warn;

pub const DEFAULT_GRPC_PORT: u16 = 9000;

pub const DEFAULT_ADMIN_PORT: u16 = 9001;

/// gRPC listener port.
pub fn grpc_port() -> u16 {
    port_from("OASGATE_GRPC_PORT", std::env::var("OASGATE_GRPC_PORT").ok(), DEFAULT_GRPC_PORT)
}

/// Admin listener port.
pub fn admin_port() -> u16 {
    port_from("OASGATE_ADMIN_PORT", std::env::var("OASGATE_ADMIN_PORT").ok(), DEFAULT_ADMIN_PORT)
}

fn port_from(name: &str, value: Option<String>, default: u16) -> u16 {
    match value {
        Some(raw) => match raw.trim().parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => {
                warn!(env_var = name, value = %raw, default, "Invalid port, using default");
                default
            }
        },
        None => default,
    }
}
