//! Process lifecycle: readiness state, signal handling and shutdown draining.
//!
//! ```text
//! Starting → Serving → Draining → Stopped
//! ```
//!
//! - **Starting**: configuration loaded, listener not yet bound
//! - **Serving**: accepting connections
//! - **Draining**: a termination signal arrived; no new connections, the
//!   in-flight ones get [`SHUTDOWN_GRACE_PERIOD`] to finish
//! - **Stopped**: the listener task has returned

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long in-flight connections may run after shutdown begins.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Serving,
    Draining,
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Serving => write!(f, "serving"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Shared shutdown coordination for the listener and its connections.
///
/// Lock-free: state lives in an `ArcSwap`, the connection count in an
/// atomic.
pub struct Lifecycle {
    state: ArcSwap<LifecycleState>,
    shutdown: CancellationToken,
    active_connections: AtomicUsize,
    grace_period: Duration,
    started_at: Instant,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(SHUTDOWN_GRACE_PERIOD)
    }
}

impl Lifecycle {
    #[must_use]
    pub fn new(grace_period: Duration) -> Self {
        Self {
            state: ArcSwap::new(Arc::new(LifecycleState::Starting)),
            shutdown: CancellationToken::new(),
            active_connections: AtomicUsize::new(0),
            grace_period,
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        **self.state.load()
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        matches!(
            self.state(),
            LifecycleState::Draining | LifecycleState::Stopped
        )
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn mark_serving(&self) {
        self.state.store(Arc::new(LifecycleState::Serving));
        info!(
            startup_ms = self.started_at.elapsed().as_millis(),
            "Gateway serving"
        );
    }

    /// Token cancelled when shutdown begins.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting work. Idempotent.
    pub fn begin_shutdown(&self) {
        if self.is_shutting_down() {
            return;
        }
        self.state.store(Arc::new(LifecycleState::Draining));
        self.shutdown.cancel();
        info!(
            active_connections = self.active_connection_count(),
            grace_period = ?self.grace_period,
            "Shutdown initiated"
        );
    }

    pub fn mark_stopped(&self) {
        self.state.store(Arc::new(LifecycleState::Stopped));
    }

    /// Count a connection until the guard drops. `None` once draining.
    #[must_use]
    pub fn track_connection(self: &Arc<Self>) -> Option<ConnectionGuard> {
        if self.is_shutting_down() {
            return None;
        }
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        Some(ConnectionGuard {
            lifecycle: Arc::clone(self),
        })
    }

    #[must_use]
    pub fn active_connection_count(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// Wait for tracked connections to finish, at most the grace period.
    pub async fn drain(&self) -> DrainResult {
        let deadline = Instant::now() + self.grace_period;

        loop {
            let active = self.active_connection_count();
            if active == 0 {
                return DrainResult::Complete;
            }
            if Instant::now() >= deadline {
                warn!(
                    active_connections = active,
                    "Grace period elapsed, aborting remaining connections"
                );
                return DrainResult::Timeout { remaining: active };
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

/// Decrements the connection count on drop, panics included.
pub struct ConnectionGuard {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.lifecycle
            .active_connections
            .fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainResult {
    Complete,
    Timeout { remaining: usize },
}

/// Begin shutdown on SIGINT or SIGTERM.
pub fn spawn_signal_handlers(lifecycle: Arc<Lifecycle>) {
    let on_sigint = lifecycle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT");
                on_sigint.begin_shutdown();
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGINT"),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
                lifecycle.begin_shutdown();
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGTERM"),
        }
    });

    #[cfg(not(unix))]
    let _ = lifecycle;
}
