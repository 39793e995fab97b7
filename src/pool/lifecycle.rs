//! Per-worker lifecycle: request counting, jittered recycling and draining.
//!
//! ```text
//! Starting ──ready──▶ Serving ──threshold / signal──▶ Draining ──▶ Terminated
//!     │                                                  (idle or grace
//!     └──────────────── startup failure ───────────────▶  deadline)
//! ```
//!
//! The recycle threshold is drawn once, when the worker enters `Serving`,
//! as `base ± uniform(jitter)`. Drawing per worker keeps a pool from
//! recycling every worker in lockstep.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Lifecycle state of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Starting,
    Serving,
    Draining,
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Starting => "starting",
            WorkerState::Serving => "serving",
            WorkerState::Draining => "draining",
            WorkerState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Identity of a worker: its pool slot and how many times that slot has
/// been (re)filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WorkerId {
    pub slot: usize,
    pub generation: u64,
}

impl WorkerId {
    pub fn new(slot: usize, generation: u64) -> Self {
        Self { slot, generation }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}/gen-{}", self.slot, self.generation)
    }
}

/// Recycling and draining parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecyclePolicy {
    /// Requests before recycling; zero disables recycling
    pub base_max_requests: u64,
    /// Maximum random offset from the base, in either direction
    pub jitter: u64,
    /// How long a draining worker may finish in-flight requests
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
    /// In-flight requests accepted at once
    pub max_concurrent: usize,
}

impl Default for RecyclePolicy {
    fn default() -> Self {
        Self {
            base_max_requests: 1000,
            jitter: 50,
            grace_period: Duration::from_secs(30),
            max_concurrent: 1000,
        }
    }
}

impl RecyclePolicy {
    /// Draw a recycle threshold, or `None` when recycling is disabled.
    pub fn draw_threshold<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<u64> {
        if self.base_max_requests == 0 {
            return None;
        }
        let jitter = i64::try_from(self.jitter).unwrap_or(i64::MAX);
        let offset = if jitter == 0 {
            0
        } else {
            rng.gen_range(-jitter..=jitter)
        };
        let base = i64::try_from(self.base_max_requests).unwrap_or(i64::MAX);
        Some(base.saturating_add(offset).max(1) as u64)
    }

    /// Every threshold [`draw_threshold`](Self::draw_threshold) can return,
    /// or `None` when recycling is disabled.
    pub fn threshold_range(&self) -> Option<RangeInclusive<u64>> {
        if self.base_max_requests == 0 {
            return None;
        }
        let low = self.base_max_requests.saturating_sub(self.jitter).max(1);
        let high = self.base_max_requests.saturating_add(self.jitter);
        Some(low..=high)
    }
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The worker is not accepting new work
    NotServing(WorkerState),
    /// The worker already runs its maximum number of requests
    AtCapacity(usize),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotServing(state) => write!(f, "worker is {}", state),
            Rejection::AtCapacity(n) => write!(f, "worker is at capacity ({} requests)", n),
        }
    }
}

/// Point-in-time view of a worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub requests_served: u64,
    pub in_flight: usize,
    pub recycle_threshold: Option<u64>,
    pub state: WorkerState,
    pub started_at: DateTime<Utc>,
}

struct Inner {
    state: WorkerState,
    served: u64,
    threshold: Option<u64>,
    started_at: DateTime<Utc>,
    reached_serving: bool,
}

/// Lifecycle manager for a single worker.
///
/// Shared behind an `Arc` between the HTTP middleware, the signal handler
/// and the worker's main task.
pub struct WorkerLifecycle {
    id: WorkerId,
    policy: RecyclePolicy,
    inner: Mutex<Inner>,
    in_flight: AtomicUsize,
    state_tx: watch::Sender<WorkerState>,
    idle: Notify,
}

impl WorkerLifecycle {
    /// Create a lifecycle in the `Starting` state.
    pub fn new(id: WorkerId, policy: RecyclePolicy) -> Arc<Self> {
        let (state_tx, _) = watch::channel(WorkerState::Starting);
        Arc::new(Self {
            id,
            policy,
            inner: Mutex::new(Inner {
                state: WorkerState::Starting,
                served: 0,
                threshold: None,
                started_at: Utc::now(),
                reached_serving: false,
            }),
            in_flight: AtomicUsize::new(0),
            state_tx,
            idle: Notify::new(),
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn policy(&self) -> &RecyclePolicy {
        &self.policy
    }

    pub fn state(&self) -> WorkerState {
        self.inner.lock().state
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Enter `Serving`, drawing the recycle threshold from `rng`.
    ///
    /// The threshold is fixed for the worker's lifetime; calling this again
    /// has no effect and returns the existing threshold.
    pub fn mark_serving<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<u64> {
        let threshold = self.policy.draw_threshold(rng);
        self.mark_serving_with_threshold(threshold)
    }

    /// Enter `Serving` with an explicit threshold.
    pub fn mark_serving_with_threshold(&self, threshold: Option<u64>) -> Option<u64> {
        let mut inner = self.inner.lock();
        if inner.state != WorkerState::Starting {
            return inner.threshold;
        }
        inner.threshold = threshold;
        inner.started_at = Utc::now();
        inner.reached_serving = true;
        self.transition(&mut inner, WorkerState::Serving);
        info!(
            worker = %self.id,
            recycle_after = ?threshold,
            "Worker serving"
        );
        threshold
    }

    /// Record a startup failure: `Starting` goes straight to `Terminated`.
    pub fn mark_startup_failed(&self, reason: impl Into<String>) -> Error {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, WorkerState::Terminated);
        Error::worker_startup(self.id.slot, reason)
    }

    /// Admit a request. The returned guard completes it when dropped.
    pub fn try_begin_request(self: &Arc<Self>) -> std::result::Result<RequestGuard, Rejection> {
        let inner = self.inner.lock();
        if inner.state != WorkerState::Serving {
            return Err(Rejection::NotServing(inner.state));
        }
        let current = self.in_flight.load(Ordering::Acquire);
        if current >= self.policy.max_concurrent {
            return Err(Rejection::AtCapacity(current));
        }
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        drop(inner);

        Ok(RequestGuard {
            lifecycle: Arc::clone(self),
        })
    }

    fn complete_request(&self) {
        let mut inner = self.inner.lock();
        inner.served += 1;
        let remaining = self.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;

        if inner.state == WorkerState::Serving
            && inner.threshold.is_some_and(|t| inner.served >= t)
        {
            info!(
                worker = %self.id,
                served = inner.served,
                "Recycle threshold reached; draining"
            );
            self.transition(&mut inner, WorkerState::Draining);
        }
        drop(inner);

        if remaining == 0 {
            self.idle.notify_waiters();
        }
    }

    /// Stop accepting new requests. Returns false if the worker was not
    /// serving.
    pub fn begin_drain(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != WorkerState::Serving {
            return false;
        }
        info!(worker = %self.id, in_flight = self.in_flight(), "Draining worker");
        self.transition(&mut inner, WorkerState::Draining);
        true
    }

    /// Resolve once the worker has left `Starting`, with whether it got as
    /// far as serving.
    pub async fn ready(&self) -> bool {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(|s| *s != WorkerState::Starting).await;
        self.inner.lock().reached_serving
    }

    /// Resolve once the worker has stopped serving.
    pub async fn draining(&self) {
        let mut rx = self.state_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx
            .wait_for(|s| matches!(s, WorkerState::Draining | WorkerState::Terminated))
            .await;
    }

    /// Finish in-flight requests, then terminate.
    ///
    /// If requests are still running after `grace`, the worker is forced to
    /// `Terminated` anyway and a [`Error::DrainTimeout`] is returned for the
    /// caller to log. It is never retried.
    pub async fn drain(&self, grace: Duration) -> Result<()> {
        self.begin_drain();

        let finished = tokio::time::timeout(grace, self.wait_idle()).await;
        let in_flight = self.in_flight();

        let mut inner = self.inner.lock();
        self.transition(&mut inner, WorkerState::Terminated);
        let served = inner.served;
        drop(inner);

        match finished {
            Ok(()) => {
                info!(worker = %self.id, served, "Worker drained");
                Ok(())
            }
            Err(_) => {
                let err = Error::DrainTimeout {
                    worker: self.id.to_string(),
                    in_flight,
                    grace,
                };
                warn!(worker = %self.id, error = %err, "Forced worker termination");
                Err(err)
            }
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Snapshot of this worker's record.
    pub fn record(&self) -> WorkerRecord {
        let inner = self.inner.lock();
        WorkerRecord {
            id: self.id,
            requests_served: inner.served,
            in_flight: self.in_flight(),
            recycle_threshold: inner.threshold,
            state: inner.state,
            started_at: inner.started_at,
        }
    }

    fn transition(&self, inner: &mut Inner, next: WorkerState) {
        if inner.state != next {
            inner.state = next;
            self.state_tx.send_replace(next);
        }
    }
}

impl fmt::Debug for WorkerLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerLifecycle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// An admitted request. Dropping it marks the request complete.
#[must_use = "dropping the guard completes the request immediately"]
pub struct RequestGuard {
    lifecycle: Arc<WorkerLifecycle>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.lifecycle.complete_request();
    }
}
