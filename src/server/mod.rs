//! HTTP server for a single worker process.
//!
//! A [`Worker`] is prepared in three steps: the mount plan is decided from
//! the snapshot, factories are registered for the mounted groups, and, when
//! lazy loading is off, every registered component is built up front. Any
//! failure before serving is a startup failure for the worker's slot.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use leanserve::config::ConfigSnapshot;
//! use leanserve::pool::WorkerId;
//! use leanserve::server::{bind_listener, Worker};
//! use tokio_util::sync::CancellationToken;
//!
//! let snapshot = Arc::new(ConfigSnapshot::default());
//! let worker = Worker::prepare(snapshot.clone(), WorkerId::new(0, 1))?;
//! worker.serve(bind_listener(&snapshot.bind_address())?, CancellationToken::new()).await?;
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod shutdown;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

pub use error::{ApiError, ApiResult};
pub use routes::{Gate, GroupDecision, MountPlan, RouteGroup};
pub use shutdown::cancel_on_signals;
pub use state::AppState;

use crate::config::ConfigSnapshot;
use crate::error::{Error, Result};
use crate::pool::{WorkerId, WorkerLifecycle};
use crate::startup::{LazyComponentRegistry, StartupMetrics, StartupPhase};

/// A prepared worker, ready to serve.
#[derive(Debug)]
pub struct Worker {
    state: Arc<AppState>,
    metrics: StartupMetrics,
}

impl Worker {
    /// Mount routes, register components and prewarm if configured.
    pub fn prepare(snapshot: Arc<ConfigSnapshot>, id: WorkerId) -> Result<Self> {
        let mut metrics = StartupMetrics::new();
        let lifecycle = WorkerLifecycle::new(id, snapshot.recycle().clone());

        let plan = metrics.measure(StartupPhase::RouteMounting, || MountPlan::resolve(&snapshot));
        let groups: Vec<&str> = plan.groups().map(|g| g.name()).collect();
        info!(worker = %id, groups = ?groups, "Route groups mounted");

        let registry = Arc::new(LazyComponentRegistry::new());
        metrics
            .measure(StartupPhase::ComponentRegistration, || {
                plan.register_components(&registry, &snapshot)
            })
            .map_err(|e| lifecycle.mark_startup_failed(e.to_string()))?;

        if !snapshot.lazy_load() {
            debug!(worker = %id, "Lazy loading disabled; prewarming components");
            metrics
                .measure(StartupPhase::Prewarm, || registry.prewarm_all())
                .map_err(|e| lifecycle.mark_startup_failed(e.to_string()))?;
        }

        let state = Arc::new(AppState::new(snapshot, registry, lifecycle, plan));
        Ok(Self { state, metrics })
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn lifecycle(&self) -> &Arc<WorkerLifecycle> {
        &self.state.lifecycle
    }

    /// Build the router with request tracking and optional tracing.
    pub fn router(&self) -> Router {
        let state = Arc::clone(&self.state);
        let mut app = state.plan.router(Arc::clone(&state)).layer(
            axum::middleware::from_fn_with_state(Arc::clone(&state), middleware::track_requests),
        );

        if state.snapshot.telemetry() {
            app = app.layer(TraceLayer::new_for_http());
        }
        app
    }

    /// Serve until the worker recycles itself or `shutdown` is cancelled,
    /// then drain.
    ///
    /// A drain that overruns the grace period is logged and the server is
    /// dropped with the remaining requests; it is not reported as an error.
    pub async fn serve(
        mut self,
        listener: std::net::TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let lifecycle = Arc::clone(&self.state.lifecycle);
        let grace = self.state.snapshot.grace_period();

        self.metrics.start_phase(StartupPhase::Bind);
        let listener = listener
            .set_nonblocking(true)
            .and_then(|()| tokio::net::TcpListener::from_std(listener))
            .map_err(|e| lifecycle.mark_startup_failed(format!("cannot adopt listener: {}", e)))?;
        self.metrics.end_phase(StartupPhase::Bind);

        let router = self.router();
        let addr = listener.local_addr().ok();

        // Serving before the first accept, so no early request sees Starting.
        lifecycle.mark_serving(&mut rand::thread_rng());

        let stop = {
            let lifecycle = Arc::clone(&lifecycle);
            async move { lifecycle.draining().await }
        };
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(stop)
                .await
        });

        self.metrics.finish();
        self.metrics.report();
        info!(worker = %lifecycle.id(), address = ?addr, "Worker accepting requests");

        tokio::select! {
            _ = lifecycle.draining() => {}
            _ = shutdown.cancelled() => {}
            joined = &mut server => {
                return match joined {
                    Ok(Ok(())) => Err(Error::Server("server stopped unexpectedly".to_string())),
                    Ok(Err(e)) => Err(Error::from(e)),
                    Err(e) => Err(Error::Server(e.to_string())),
                };
            }
        }

        match lifecycle.drain(grace).await {
            Ok(()) => match tokio::time::timeout(grace, &mut server).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!(error = %e, "Server error during shutdown"),
                Ok(Err(e)) => error!(error = %e, "Server task failed"),
                Err(_) => {
                    warn!(worker = %lifecycle.id(), "Connections still open after drain; closing");
                    server.abort();
                }
            },
            // Already logged as a forced termination.
            Err(_) => server.abort(),
        }
        Ok(())
    }
}

/// Bind a listening socket.
pub fn bind_listener(address: &str) -> Result<std::net::TcpListener> {
    let listener = std::net::TcpListener::bind(address)?;
    info!(address = %address, "Listening");
    Ok(listener)
}

/// The listening socket handed down by the supervisor, if any.
#[cfg(unix)]
pub fn inherited_listener() -> Result<Option<std::net::TcpListener>> {
    use std::os::unix::io::{FromRawFd, RawFd};

    let Ok(value) = std::env::var(crate::pool::LISTEN_FD_ENV) else {
        return Ok(None);
    };
    let fd: RawFd = value.trim().parse().map_err(|_| {
        Error::config(
            crate::pool::LISTEN_FD_ENV,
            format!("expected a file descriptor, got '{}'", value),
        )
    })?;

    // SAFETY: the supervisor cleared FD_CLOEXEC on its listening socket and
    // passed that descriptor number; this process takes sole ownership.
    let listener = unsafe { std::net::TcpListener::from_raw_fd(fd) };
    Ok(Some(listener))
}

#[cfg(not(unix))]
pub fn inherited_listener() -> Result<Option<std::net::TcpListener>> {
    Ok(None)
}
