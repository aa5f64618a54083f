//! Startup steps that can fail before the servers come up.

use std::net::SocketAddr;
use std::path::Path;

use oasgate_core::contract::{
    OpenApiValidator, build_queryable_model, find_contract_file, load_contract, read_contract,
};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::ProxyError;

/// Locates, parses, and compiles the contract.
///
/// Failures are logged here so the reason is written before the caller
/// unwinds and flushes the log writer.
pub fn load_engine(explicit: Option<&Path>) -> Result<OpenApiValidator, ProxyError> {
    let load = || {
        let path = find_contract_file(explicit)?;
        info!(path = %path.display(), "Loading OpenAPI contract");
        let bytes = read_contract(&path)?;
        build_queryable_model(load_contract(&bytes)?)
    };

    load().map_err(|e| {
        error!(error = %e, "Failed to load OpenAPI contract, refusing to start");
        ProxyError::Contract(e)
    })
}

/// Binds the gRPC listener on `bind:port`.
pub async fn bind_grpc(bind: &str, port: u16) -> Result<TcpListener, ProxyError> {
    let addr = format!("{bind}:{port}");
    let socket: SocketAddr = addr.parse().map_err(|source| ProxyError::InvalidAddress {
        addr: addr.clone(),
        source,
    })?;

    TcpListener::bind(socket)
        .await
        .map_err(|source| ProxyError::Bind { addr, source })
}
