//! Operational lifecycle of the sidecar.
//!
//! ```text
//! Starting ──(contract loaded, servers bound)──► Ready
//!    │                                             │
//!    └───────────(SIGINT / SIGTERM)────────────────┴──► ShuttingDown ──► Stopped
//! ```
//!
//! The state lives in an [`ArcSwap`] so probes read it without locking.
//! Shutdown is broadcast through a [`CancellationToken`] that both the gRPC
//! and admin servers wait on.
//!
//! # Environment Variables
//!
//! - `OASGATE_SHUTDOWN_TIMEOUT_SECS`: overall graceful shutdown budget (default 30)
//! - `OASGATE_DRAIN_TIMEOUT_SECS`: time to wait for in-flight checks (default 25)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::parse_warn;

pub mod health;

pub use health::{HealthResponse, ReadinessChecks, ReadinessResponse, health_router};

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Loading the contract, binding listeners.
    Starting,
    /// Serving checks.
    Ready,
    /// Draining in-flight checks.
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::ShuttingDown => write!(f, "shutting_down"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Lifecycle timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub shutdown_timeout: Duration,
    /// Always strictly below `shutdown_timeout`.
    pub drain_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(25),
        }
    }
}

impl LifecycleConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads timeouts through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let shutdown_timeout = Duration::from_secs(parse_warn(
            &lookup,
            "OASGATE_SHUTDOWN_TIMEOUT_SECS",
            default.shutdown_timeout.as_secs(),
        ));
        let drain_timeout = Duration::from_secs(parse_warn(
            &lookup,
            "OASGATE_DRAIN_TIMEOUT_SECS",
            default.drain_timeout.as_secs(),
        ));

        let drain_timeout = if drain_timeout >= shutdown_timeout {
            let adjusted = Duration::from_secs(shutdown_timeout.as_secs() * 4 / 5);
            warn!(
                drain_timeout_secs = drain_timeout.as_secs(),
                shutdown_timeout_secs = shutdown_timeout.as_secs(),
                adjusted_drain_secs = adjusted.as_secs(),
                "drain_timeout must be less than shutdown_timeout, adjusting"
            );
            adjusted
        } else {
            drain_timeout
        };

        Self {
            shutdown_timeout,
            drain_timeout,
        }
    }
}

/// Result of waiting for in-flight checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainResult {
    Complete,
    Timeout { remaining: usize },
}

/// Shared lifecycle state for probes, servers, and signal handling.
pub struct LifecycleManager {
    state: ArcSwap<LifecycleState>,
    started_at: Instant,
    shutdown_token: CancellationToken,
    active_checks: AtomicUsize,
    contract_loaded: AtomicBool,
    config: LifecycleConfig,
    version: &'static str,
}

impl LifecycleManager {
    #[must_use]
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            state: ArcSwap::new(Arc::new(LifecycleState::Starting)),
            started_at: Instant::now(),
            shutdown_token: CancellationToken::new(),
            active_checks: AtomicUsize::new(0),
            contract_loaded: AtomicBool::new(false),
            config,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        **self.state.load()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state(), LifecycleState::Ready)
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        matches!(
            self.state(),
            LifecycleState::ShuttingDown | LifecycleState::Stopped
        )
    }

    /// Transitions to Ready. Has no effect once shutdown has begun.
    pub fn mark_ready(&self) {
        if self.is_shutting_down() {
            return;
        }
        self.state.store(Arc::new(LifecycleState::Ready));
        info!(
            version = %self.version,
            startup_duration_ms = self.started_at.elapsed().as_millis(),
            "oasgate ready"
        );
    }

    pub fn mark_contract_loaded(&self) {
        self.contract_loaded.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn begin_shutdown(&self) {
        self.state.store(Arc::new(LifecycleState::ShuttingDown));
        self.shutdown_token.cancel();
        info!(
            active_checks = self.active_checks.load(Ordering::SeqCst),
            "Shutdown initiated"
        );
    }

    pub fn mark_stopped(&self) {
        self.state.store(Arc::new(LifecycleState::Stopped));
    }

    /// Counts a check as in flight until the guard is dropped.
    #[must_use]
    pub fn track_check(self: &Arc<Self>) -> CheckGuard {
        self.active_checks.fetch_add(1, Ordering::SeqCst);
        CheckGuard {
            manager: Arc::clone(self),
        }
    }

    #[must_use]
    pub fn active_check_count(&self) -> usize {
        self.active_checks.load(Ordering::SeqCst)
    }

    /// Waits for in-flight checks, up to the drain timeout.
    pub async fn drain_checks(&self) -> DrainResult {
        let deadline = Instant::now() + self.config.drain_timeout;

        loop {
            let active = self.active_checks.load(Ordering::SeqCst);
            if active == 0 {
                return DrainResult::Complete;
            }
            if Instant::now() > deadline {
                warn!(active_checks = active, "Drain timeout exceeded, forcing shutdown");
                return DrainResult::Timeout { remaining: active };
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    #[must_use]
    pub fn version(&self) -> &'static str {
        self.version
    }

    #[must_use]
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    #[must_use]
    pub fn readiness_checks(&self) -> ReadinessChecks {
        ReadinessChecks {
            contract_loaded: self.contract_loaded.load(Ordering::SeqCst),
        }
    }
}

/// In-flight check marker returned by [`LifecycleManager::track_check`].
pub struct CheckGuard {
    manager: Arc<LifecycleManager>,
}

impl Drop for CheckGuard {
    fn drop(&mut self) {
        self.manager.active_checks.fetch_sub(1, Ordering::SeqCst);
    }
}
