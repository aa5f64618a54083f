//! oasgate: Envoy `ext_authz` sidecar that validates every request against
//! an OpenAPI contract.
//!
//! Startup order:
//! 1. logging, lifecycle, metrics registry, signal handlers
//! 2. admin server (probes answer 503 until the contract is loaded)
//! 3. contract load and model build (fatal on failure)
//! 4. gRPC listener bind; readiness is reported only after it succeeds
//! 5. gRPC server with the Authorization and Health services

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use envoy_types::pb::envoy::service::auth::v3::authorization_server::AuthorizationServer;
use oasgate_core::lifecycle::{DrainResult, LifecycleConfig, LifecycleManager};
use oasgate_core::telemetry::CheckMetrics;
use oasgate_core::{CheckPipeline, PipelineConfig};
use oasgate_proxy::admin::{AdminServer, AdminServerConfig};
use oasgate_proxy::authz::AuthzService;
use oasgate_proxy::error::ProxyError;
use oasgate_proxy::ports::{admin_port, grpc_port};
use oasgate_proxy::startup::{bind_grpc, load_engine};
use prometheus_client::registry::Registry;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic_health::server::HealthReporter;
use tracing::{error, info, warn};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bind address for the gRPC and admin listeners.
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// OpenAPI contract (JSON or YAML). If not specified, searches
    /// /etc/openapi/openapi.{json,yaml} and ./openapi.{json,yaml}.
    #[arg(long, env = "OASGATE_CONTRACT")]
    contract: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), ProxyError> {
    // Dropping the guard flushes buffered log lines, so every exit path
    // returns through here instead of calling `process::exit`.
    let (non_blocking, log_guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let result = run(Cli::parse()).await;
    if let Err(e) = &result {
        error!(error = %e, "oasgate stopped with an error");
    }
    drop(log_guard);
    result
}

async fn run(cli: Cli) -> Result<(), ProxyError> {
    let lifecycle = Arc::new(LifecycleManager::new(LifecycleConfig::from_env()));
    let mut registry = Registry::default();
    let metrics = Arc::new(CheckMetrics::new(&mut registry));
    let registry = Arc::new(registry);

    setup_signal_handlers(lifecycle.clone());

    let admin = AdminServer::with_config(
        lifecycle.clone(),
        registry,
        AdminServerConfig::new(cli.bind.clone(), admin_port()),
    );
    let admin_shutdown = lifecycle.shutdown_token();
    let admin_handle = tokio::spawn(async move {
        if let Err(e) = admin.run(admin_shutdown).await {
            error!(error = %e, "Admin server failed");
        }
    });

    let engine = match load_engine(cli.contract.as_deref()) {
        Ok(engine) => engine,
        Err(e) => {
            lifecycle.begin_shutdown();
            lifecycle.mark_stopped();
            return Err(e);
        }
    };
    lifecycle.mark_contract_loaded();

    let pipeline_config = PipelineConfig::from_env();
    info!(
        non_http_policy = %pipeline_config.non_http_policy,
        include_values = pipeline_config.include_values,
        "Pipeline configured"
    );
    let pipeline =
        Arc::new(CheckPipeline::new(Arc::new(engine), pipeline_config).with_metrics(metrics));
    let service = AuthzService::new(pipeline, lifecycle.clone());

    let listener = match bind_grpc(&cli.bind, grpc_port()).await {
        Ok(listener) => listener,
        Err(e) => {
            lifecycle.begin_shutdown();
            lifecycle.mark_stopped();
            return Err(e);
        }
    };
    let local_addr = listener
        .local_addr()
        .map_err(|source| ProxyError::Bind {
            addr: format!("{}:{}", cli.bind, grpc_port()),
            source,
        })?;

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<AuthorizationServer<AuthzService>>()
        .await;

    let shutdown_signal = graceful_stop(lifecycle.clone(), health_reporter);
    let mut server = tokio::spawn(
        Server::builder()
            .add_service(health_service)
            .add_service(AuthorizationServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown_signal),
    );

    info!(addr = %local_addr, "gRPC authorization server listening");
    lifecycle.mark_ready();

    let shutdown = lifecycle.shutdown_token();
    tokio::select! {
        result = &mut server => {
            // The server only returns before shutdown if it failed.
            lifecycle.begin_shutdown();
            lifecycle.mark_stopped();
            result??;
            return Ok(());
        }
        _ = shutdown.cancelled() => {}
    }

    let shutdown_timeout = lifecycle.config().shutdown_timeout;
    match tokio::time::timeout(shutdown_timeout, &mut server).await {
        Ok(result) => result??,
        Err(_) => {
            warn!(
                shutdown_timeout_secs = shutdown_timeout.as_secs(),
                "gRPC server did not stop in time, aborting"
            );
            server.abort();
        }
    }

    if admin_handle.await.is_err() {
        warn!("Admin server task ended abnormally");
    }

    lifecycle.mark_stopped();

    match lifecycle.drain_checks().await {
        DrainResult::Complete => {
            info!("Shut down cleanly");
            Ok(())
        }
        DrainResult::Timeout { remaining } => Err(ProxyError::DrainTimeout { remaining }),
    }
}

/// Resolves once shutdown has begun, the health service reports NOT_SERVING,
/// and in-flight checks have drained. The gRPC server keeps answering until
/// then so Envoy sees a clean hand-off.
async fn graceful_stop(lifecycle: Arc<LifecycleManager>, mut health: HealthReporter) {
    lifecycle.shutdown_token().cancelled().await;
    health
        .set_not_serving::<AuthorizationServer<AuthzService>>()
        .await;

    info!(
        active_checks = lifecycle.active_check_count(),
        drain_timeout_secs = lifecycle.config().drain_timeout.as_secs(),
        "Waiting for in-flight checks to drain"
    );
    if let DrainResult::Timeout { remaining } = lifecycle.drain_checks().await {
        warn!(remaining, "Stopping gRPC server with checks still in flight");
    }
}

/// SIGINT and SIGTERM both begin graceful shutdown.
fn setup_signal_handlers(lifecycle: Arc<LifecycleManager>) {
    let lifecycle_sigint = lifecycle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                lifecycle_sigint.begin_shutdown();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown");
                lifecycle.begin_shutdown();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
            }
        }
    });

    #[cfg(not(unix))]
    let _ = lifecycle;
}
