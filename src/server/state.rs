//! Per-worker application state.

use std::sync::Arc;
use std::time::Instant;

use super::routes::MountPlan;
use crate::config::ConfigSnapshot;
use crate::pool::WorkerLifecycle;
use crate::startup::LazyComponentRegistry;

/// State shared by every handler of one worker.
#[derive(Debug)]
pub struct AppState {
    /// Resolved configuration
    pub snapshot: Arc<ConfigSnapshot>,
    /// Lazily built components for the mounted groups
    pub registry: Arc<LazyComponentRegistry>,
    /// Request accounting and draining
    pub lifecycle: Arc<WorkerLifecycle>,
    /// Which groups this worker serves
    pub plan: MountPlan,
    /// Worker start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        snapshot: Arc<ConfigSnapshot>,
        registry: Arc<LazyComponentRegistry>,
        lifecycle: Arc<WorkerLifecycle>,
        plan: MountPlan,
    ) -> Self {
        Self {
            snapshot,
            registry,
            lifecycle,
            plan,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
