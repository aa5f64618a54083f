//! Startup and serving errors for the proxy binary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// The contract could not be found, parsed, or compiled.
    #[error("Contract error: {0}")]
    Contract(#[from] oasgate_core::contract::ContractError),

    /// `--bind` and the port do not form a socket address.
    #[error("Invalid listen address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        source: std::net::AddrParseError,
    },

    /// A listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// The admin HTTP server failed while serving.
    #[error("Admin server error: {0}")]
    Admin(#[source] std::io::Error),

    /// The gRPC server failed.
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The gRPC server task panicked or was cancelled.
    #[error("gRPC server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// In-flight checks were still running when the drain window closed.
    #[error("Drain timeout exceeded with {remaining} checks in flight")]
    DrainTimeout { remaining: usize },
}

pub type ProxyResult<T> = Result<T, ProxyError>;
