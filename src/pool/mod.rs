//! Worker pool: sizing, per-worker lifecycle and supervision.
//!
//! The pool is a set of identical worker processes sharing one listening
//! socket. [`size`] decides how many there are, [`WorkerLifecycle`] tracks
//! each worker's request budget and draining, and [`Supervisor`] keeps the
//! slots filled.

pub mod lifecycle;
pub mod sizing;
pub mod supervisor;

pub use lifecycle::{
    Rejection, RecyclePolicy, RequestGuard, WorkerId, WorkerLifecycle, WorkerRecord, WorkerState,
};
pub use sizing::{host_cpu_count, size, PoolSizing, DEFAULT_FLOOR, DEFAULT_FRACTION};
pub use supervisor::{
    announce_ready, CrashBackoff, PoolReport, SlotState, Supervisor, WorkerExit, WorkerHandle,
    WorkerSpawner, EXIT_RECYCLED, EXIT_STARTUP_FAILED, GENERATION_ENV, LISTEN_FD_ENV, READY_LINE,
};

#[cfg(unix)]
pub use supervisor::{ProcessHandle, ProcessSpawner};
