//! Multi-process worker supervisor.
//!
//! The supervisor launches one worker per pool slot, waits for workers to
//! exit, and refills slots whose worker recycled itself or crashed.
//!
//! A worker counts as started only once it reports readiness. Any exit
//! before that, whatever its code, retires the slot for the rest of the
//! launch cycle. A worker that crashes after serving is replaced after a
//! delay that doubles with each consecutive crash in its slot; a clean
//! recycle resets the delay.
//!
//! Workers are spawned through the [`WorkerSpawner`] trait. The production
//! implementation, [`ProcessSpawner`], re-executes the current binary, hands
//! it the shared listening socket through an inherited descriptor and reads
//! [`READY_LINE`] from its stdout.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::lifecycle::{WorkerId, WorkerLifecycle};
use crate::error::{Error, Result};

/// Exit code of a worker that drained normally (recycled or shut down).
pub const EXIT_RECYCLED: i32 = 0;

/// Exit code of a worker that failed before serving (`EX_CONFIG`).
pub const EXIT_STARTUP_FAILED: i32 = 78;

/// Environment variable carrying the inherited listening descriptor.
pub const LISTEN_FD_ENV: &str = "LEANSERVE_LISTEN_FD";

/// Environment variable carrying the worker generation.
pub const GENERATION_ENV: &str = "LEANSERVE_WORKER_GENERATION";

/// Line a worker process writes to stdout once it is serving.
pub const READY_LINE: &str = "leanserve-worker-ready";

/// Write [`READY_LINE`] to `out` once `lifecycle` reaches `Serving`.
///
/// Returns false, writing nothing, if the worker failed before serving.
pub async fn announce_ready<W>(lifecycle: &WorkerLifecycle, mut out: W) -> std::io::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    if !lifecycle.ready().await {
        return Ok(false);
    }
    out.write_all(READY_LINE.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(true)
}

/// How a worker process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Drained and exited cleanly; the slot is refilled
    Recycled,
    /// Exited before reporting readiness; the slot is retired
    StartupFailed(String),
    /// Died after serving; the slot is refilled
    Crashed(String),
}

impl WorkerExit {
    /// Classify a process exit status.
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(EXIT_RECYCLED) => WorkerExit::Recycled,
            Some(EXIT_STARTUP_FAILED) => {
                WorkerExit::StartupFailed(format!("exited with code {}", EXIT_STARTUP_FAILED))
            }
            Some(code) => WorkerExit::Crashed(format!("exited with code {}", code)),
            None => WorkerExit::Crashed(describe_signal(status)),
        }
    }
}

#[cfg(unix)]
fn describe_signal(status: std::process::ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(sig) => format!("terminated by signal {}", sig),
        None => "terminated abnormally".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_signal(_status: std::process::ExitStatus) -> String {
    "terminated abnormally".to_string()
}

/// A running worker as seen by the supervisor.
#[async_trait]
pub trait WorkerHandle: Send {
    /// Wait until the worker reports that it is serving. Resolves to false
    /// if it exited, or closed its readiness channel, first.
    async fn wait_ready(&mut self) -> bool;

    /// Wait for the worker to exit.
    async fn wait(&mut self) -> WorkerExit;

    /// Ask the worker to stop accepting requests and drain.
    fn request_drain(&mut self);
}

/// Launches workers for pool slots.
#[async_trait]
pub trait WorkerSpawner: Send + Sync + 'static {
    /// Start a worker. An error here counts as a startup failure.
    async fn spawn(&self, id: WorkerId) -> Result<Box<dyn WorkerHandle>>;
}

/// State of one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Running,
    Failed,
    Stopped,
}

/// Outcome of a supervisor run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    /// Workers launched, including replacements
    pub launched: u64,
    /// Workers that drained and were replaced
    pub recycled: u64,
    /// Workers that crashed after serving and were replaced
    pub crashed: u64,
    /// Slots retired by startup failures
    pub failed_slots: Vec<usize>,
}

/// Delay before replacing a worker that crashed after serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashBackoff {
    /// Delay after the first crash in a row
    pub base: Duration,
    /// Upper bound on the delay
    pub max: Duration,
}

impl Default for CrashBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
        }
    }
}

impl CrashBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before relaunching after `consecutive` crashes in a row.
    pub fn delay(&self, consecutive: u32) -> Duration {
        if consecutive == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(consecutive - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Supervises a fixed-size pool of workers.
pub struct Supervisor<S: WorkerSpawner> {
    worker_count: usize,
    spawner: std::sync::Arc<S>,
    backoff: CrashBackoff,
}

impl<S: WorkerSpawner> fmt::Debug for Supervisor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("worker_count", &self.worker_count)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl<S: WorkerSpawner> Supervisor<S> {
    pub fn new(worker_count: usize, spawner: S) -> Self {
        Self {
            worker_count: worker_count.max(1),
            spawner: std::sync::Arc::new(spawner),
            backoff: CrashBackoff::default(),
        }
    }

    /// Replace the crash backoff.
    pub fn with_backoff(mut self, backoff: CrashBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Run the pool until `shutdown` is cancelled or every slot has failed.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<PoolReport> {
        info!(workers = self.worker_count, "Starting worker pool");

        let mut report = PoolReport::default();
        let mut slots: HashMap<usize, SlotState> = HashMap::new();
        let mut generations: HashMap<usize, u64> = HashMap::new();
        let mut crash_streaks: HashMap<usize, u32> = HashMap::new();
        let mut running = JoinSet::new();

        for slot in 0..self.worker_count {
            let id = next_id(&mut generations, slot);
            self.launch(id, Duration::ZERO, &mut running, &shutdown);
            slots.insert(slot, SlotState::Running);
            report.launched += 1;
        }

        while let Some(joined) = running.join_next().await {
            let (id, exit) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Worker monitor task failed");
                    continue;
                }
            };

            let stopping = shutdown.is_cancelled();
            let delay = match &exit {
                WorkerExit::Recycled if stopping => {
                    info!(worker = %id, "Worker stopped");
                    slots.insert(id.slot, SlotState::Stopped);
                    continue;
                }
                WorkerExit::Recycled => {
                    info!(worker = %id, "Worker recycled; starting replacement");
                    report.recycled += 1;
                    crash_streaks.remove(&id.slot);
                    Duration::ZERO
                }
                WorkerExit::StartupFailed(reason) if stopping => {
                    warn!(worker = %id, reason = %reason, "Worker stopped before serving");
                    slots.insert(id.slot, SlotState::Stopped);
                    continue;
                }
                WorkerExit::StartupFailed(reason) => {
                    let err = Error::worker_startup(id.slot, reason.clone());
                    error!(worker = %id, error = %err, "Worker slot retired");
                    slots.insert(id.slot, SlotState::Failed);
                    report.failed_slots.push(id.slot);
                    continue;
                }
                WorkerExit::Crashed(reason) if stopping => {
                    warn!(worker = %id, reason = %reason, "Worker exited during shutdown");
                    slots.insert(id.slot, SlotState::Stopped);
                    continue;
                }
                WorkerExit::Crashed(reason) => {
                    let streak = crash_streaks.entry(id.slot).or_insert(0);
                    *streak = streak.saturating_add(1);
                    let delay = self.backoff.delay(*streak);
                    warn!(
                        worker = %id,
                        reason = %reason,
                        consecutive = *streak,
                        retry_in = ?delay,
                        "Worker crashed; starting replacement"
                    );
                    report.crashed += 1;
                    delay
                }
            };

            let replacement = next_id(&mut generations, id.slot);
            self.launch(replacement, delay, &mut running, &shutdown);
            report.launched += 1;
        }

        report.failed_slots.sort_unstable();
        if slots.values().all(|state| *state == SlotState::Failed) {
            return Err(Error::worker_startup(
                report.failed_slots[0],
                format!("all {} worker slots failed to start", self.worker_count),
            ));
        }

        info!(
            launched = report.launched,
            recycled = report.recycled,
            crashed = report.crashed,
            failed = report.failed_slots.len(),
            "Worker pool stopped"
        );
        Ok(report)
    }

    fn launch(
        &self,
        id: WorkerId,
        delay: Duration,
        running: &mut JoinSet<(WorkerId, WorkerExit)>,
        shutdown: &CancellationToken,
    ) {
        let spawner = std::sync::Arc::clone(&self.spawner);
        let shutdown = shutdown.clone();

        running.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    // Never started, so there is nothing to drain.
                    _ = shutdown.cancelled() => return (id, WorkerExit::Recycled),
                }
            }

            let mut handle = match spawner.spawn(id).await {
                Ok(handle) => handle,
                Err(e) => return (id, WorkerExit::StartupFailed(e.to_string())),
            };

            let ready = tokio::select! {
                ready = handle.wait_ready() => Some(ready),
                _ = shutdown.cancelled() => None,
            };
            match ready {
                Some(true) => debug!(worker = %id, "Worker reported ready"),
                Some(false) => {
                    let exit = match wait_or_drain(handle.as_mut(), &shutdown).await {
                        WorkerExit::Recycled => {
                            WorkerExit::StartupFailed("exited before serving".to_string())
                        }
                        WorkerExit::Crashed(reason) => WorkerExit::StartupFailed(reason),
                        failed => failed,
                    };
                    return (id, exit);
                }
                None => {
                    handle.request_drain();
                    return (id, handle.wait().await);
                }
            }

            (id, wait_or_drain(handle.as_mut(), &shutdown).await)
        });
    }
}

/// Wait for the worker to exit, draining it first if `shutdown` fires.
async fn wait_or_drain(handle: &mut dyn WorkerHandle, shutdown: &CancellationToken) -> WorkerExit {
    let exit = tokio::select! {
        exit = handle.wait() => Some(exit),
        _ = shutdown.cancelled() => None,
    };
    match exit {
        Some(exit) => exit,
        None => {
            handle.request_drain();
            handle.wait().await
        }
    }
}

fn next_id(generations: &mut HashMap<usize, u64>, slot: usize) -> WorkerId {
    let generation = generations.entry(slot).or_insert(0);
    *generation += 1;
    WorkerId::new(slot, *generation)
}

#[cfg(unix)]
pub use process::{ProcessHandle, ProcessSpawner};

#[cfg(unix)]
mod process {
    use std::ffi::OsString;
    use std::os::unix::io::{AsRawFd, RawFd};
    use std::path::PathBuf;
    use std::process::Stdio;

    use async_trait::async_trait;
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::process::{Child, ChildStdout, Command};
    use tracing::debug;

    use super::{
        WorkerExit, WorkerHandle, WorkerSpawner, GENERATION_ENV, LISTEN_FD_ENV, READY_LINE,
    };
    use crate::error::{Error, Result};
    use crate::pool::lifecycle::WorkerId;

    /// Spawns workers by re-executing a binary with `--worker-slot N`.
    #[derive(Debug)]
    pub struct ProcessSpawner {
        program: PathBuf,
        args: Vec<OsString>,
        listen_fd: RawFd,
    }

    impl ProcessSpawner {
        /// Prepare to spawn `program args... --worker-slot N`, sharing
        /// `listener` with every child.
        ///
        /// The listener must outlive the spawner.
        pub fn new(
            program: PathBuf,
            args: Vec<OsString>,
            listener: &std::net::TcpListener,
        ) -> Result<Self> {
            let listen_fd = listener.as_raw_fd();
            fcntl(listen_fd, FcntlArg::F_SETFD(FdFlag::empty())).map_err(|e| {
                Error::Server(format!("cannot share listening socket with workers: {}", e))
            })?;
            Ok(Self {
                program,
                args,
                listen_fd,
            })
        }

        /// Spawner for the running executable with its current arguments.
        pub fn current_exe(listener: &std::net::TcpListener) -> Result<Self> {
            let program = std::env::current_exe()?;
            let args = std::env::args_os().skip(1).collect();
            Self::new(program, args, listener)
        }
    }

    #[async_trait]
    impl WorkerSpawner for ProcessSpawner {
        async fn spawn(&self, id: WorkerId) -> Result<Box<dyn WorkerHandle>> {
            let mut child = Command::new(&self.program)
                .args(&self.args)
                .arg("--worker-slot")
                .arg(id.slot.to_string())
                .env(LISTEN_FD_ENV, self.listen_fd.to_string())
                .env(GENERATION_ENV, id.generation.to_string())
                .stdout(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;
            debug!(worker = %id, pid = ?child.id(), "Spawned worker process");
            let stdout = child.stdout.take().map(BufReader::new);
            Ok(Box::new(ProcessHandle { child, stdout }))
        }
    }

    /// A worker child process.
    ///
    /// The child's stdout stays open for its whole life so a late write
    /// never hits a closed pipe.
    #[derive(Debug)]
    pub struct ProcessHandle {
        child: Child,
        stdout: Option<BufReader<ChildStdout>>,
    }

    #[async_trait]
    impl WorkerHandle for ProcessHandle {
        async fn wait_ready(&mut self) -> bool {
            let Some(stdout) = self.stdout.as_mut() else {
                return false;
            };
            let mut line = String::new();
            loop {
                line.clear();
                match stdout.read_line(&mut line).await {
                    Ok(0) => return false,
                    Ok(_) if line.trim_end() == READY_LINE => return true,
                    Ok(_) => debug!(output = %line.trim_end(), "Worker stdout"),
                    Err(e) => {
                        debug!(error = %e, "Cannot read worker readiness");
                        return false;
                    }
                }
            }
        }

        async fn wait(&mut self) -> WorkerExit {
            match self.child.wait().await {
                Ok(status) => WorkerExit::from_status(status),
                Err(e) => WorkerExit::Crashed(format!("wait failed: {}", e)),
            }
        }

        fn request_drain(&mut self) {
            if let Some(pid) = self.child.id() {
                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    debug!(pid, error = %e, "Failed to signal worker");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::lifecycle::RecyclePolicy;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// One scripted worker: whether it reports ready, then how it exits.
    type Step = (bool, WorkerExit);

    fn served(exit: WorkerExit) -> Step {
        (true, exit)
    }

    fn never_ready(exit: WorkerExit) -> Step {
        (false, exit)
    }

    /// Spawner whose workers follow scripted steps per slot.
    /// Once a slot's script runs out, its workers serve until drained.
    struct ScriptedSpawner {
        scripts: Mutex<HashMap<usize, VecDeque<Step>>>,
        spawned: Arc<Mutex<Vec<WorkerId>>>,
    }

    impl ScriptedSpawner {
        fn new(scripts: Vec<(usize, Vec<Step>)>) -> Self {
            Self {
                scripts: Mutex::new(
                    scripts
                        .into_iter()
                        .map(|(slot, steps)| (slot, steps.into_iter().collect()))
                        .collect(),
                ),
                spawned: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn launches_in(spawned: &Mutex<Vec<WorkerId>>, slot: usize) -> usize {
            spawned.lock().iter().filter(|id| id.slot == slot).count()
        }
    }

    struct ScriptedHandle {
        ready: bool,
        exit: Option<WorkerExit>,
        drained: CancellationToken,
    }

    #[async_trait]
    impl WorkerHandle for ScriptedHandle {
        async fn wait_ready(&mut self) -> bool {
            self.ready
        }

        async fn wait(&mut self) -> WorkerExit {
            match self.exit.take() {
                Some(exit) => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    exit
                }
                None => {
                    self.drained.cancelled().await;
                    WorkerExit::Recycled
                }
            }
        }

        fn request_drain(&mut self) {
            self.drained.cancel();
        }
    }

    #[async_trait]
    impl WorkerSpawner for ScriptedSpawner {
        async fn spawn(&self, id: WorkerId) -> Result<Box<dyn WorkerHandle>> {
            self.spawned.lock().push(id);
            let step = self
                .scripts
                .lock()
                .get_mut(&id.slot)
                .and_then(|script| script.pop_front());
            let (ready, exit) = match step {
                Some((ready, exit)) => (ready, Some(exit)),
                None => (true, None),
            };
            Ok(Box::new(ScriptedHandle {
                ready,
                exit,
                drained: CancellationToken::new(),
            }))
        }
    }

    fn cancel_after(ms: u64) -> CancellationToken {
        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            stopper.cancel();
        });
        shutdown
    }

    fn fast_backoff() -> CrashBackoff {
        CrashBackoff::new(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_recycled_workers_are_replaced() {
        let spawner = ScriptedSpawner::new(vec![(
            0,
            vec![served(WorkerExit::Recycled), served(WorkerExit::Recycled)],
        )]);
        let spawned = Arc::clone(&spawner.spawned);
        let supervisor = Supervisor::new(2, spawner);

        let report = supervisor.run(cancel_after(100)).await.unwrap();
        assert_eq!(report.recycled, 2);
        assert_eq!(report.launched, 4);
        assert!(report.failed_slots.is_empty());

        let generations: Vec<u64> = spawned
            .lock()
            .iter()
            .filter(|id| id.slot == 0)
            .map(|id| id.generation)
            .collect();
        assert_eq!(generations, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_startup_failure_retires_slot_without_restart() {
        let spawner = ScriptedSpawner::new(vec![(
            1,
            vec![never_ready(WorkerExit::StartupFailed("bad config".to_string()))],
        )]);
        let spawned = Arc::clone(&spawner.spawned);
        let supervisor = Supervisor::new(2, spawner);

        let report = supervisor.run(cancel_after(100)).await.unwrap();
        assert_eq!(report.failed_slots, vec![1]);
        assert_eq!(ScriptedSpawner::launches_in(&spawned, 1), 1);
    }

    #[tokio::test]
    async fn test_all_slots_failing_is_an_error() {
        let spawner = ScriptedSpawner::new(vec![
            (0, vec![never_ready(WorkerExit::StartupFailed("port in use".to_string()))]),
            (1, vec![never_ready(WorkerExit::StartupFailed("port in use".to_string()))]),
        ]);
        let supervisor = Supervisor::new(2, spawner);

        let err = supervisor.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::WorkerStartup { slot: 0, .. }));
    }

    #[tokio::test]
    async fn test_crash_before_ready_retires_slot() {
        // An import-time panic or a missing library: the process dies with
        // an arbitrary code before it ever serves.
        let spawner = ScriptedSpawner::new(vec![(
            0,
            vec![
                never_ready(WorkerExit::Crashed("exited with code 101".to_string())),
                never_ready(WorkerExit::Crashed("exited with code 101".to_string())),
            ],
        )]);
        let spawned = Arc::clone(&spawner.spawned);
        let supervisor = Supervisor::new(2, spawner).with_backoff(fast_backoff());

        let report = supervisor.run(cancel_after(100)).await.unwrap();
        assert_eq!(report.failed_slots, vec![0]);
        assert_eq!(report.crashed, 0);
        assert_eq!(ScriptedSpawner::launches_in(&spawned, 0), 1);
    }

    #[tokio::test]
    async fn test_clean_exit_before_ready_is_a_startup_failure() {
        let spawner = ScriptedSpawner::new(vec![(0, vec![never_ready(WorkerExit::Recycled)])]);
        let supervisor = Supervisor::new(1, spawner);

        let err = supervisor.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::WorkerStartup { slot: 0, .. }));
    }

    #[tokio::test]
    async fn test_crashed_workers_are_replaced() {
        let spawner = ScriptedSpawner::new(vec![(
            0,
            vec![served(WorkerExit::Crashed("signal 9".to_string()))],
        )]);
        let supervisor = Supervisor::new(1, spawner).with_backoff(fast_backoff());

        let report = supervisor.run(cancel_after(60)).await.unwrap();
        assert_eq!(report.crashed, 1);
        assert_eq!(report.launched, 2);
    }

    #[tokio::test]
    async fn test_crash_loop_after_serving_is_backed_off() {
        let crashes = (0..50)
            .map(|_| served(WorkerExit::Crashed("signal 11".to_string())))
            .collect();
        let spawner = ScriptedSpawner::new(vec![(0, crashes)]);
        let spawned = Arc::clone(&spawner.spawned);
        let backoff = CrashBackoff::new(Duration::from_millis(40), Duration::from_secs(1));
        let supervisor = Supervisor::new(1, spawner).with_backoff(backoff);

        let report = supervisor.run(cancel_after(300)).await.unwrap();

        // Delays of 40, 80 and 160ms leave room for at most four launches.
        let launches = ScriptedSpawner::launches_in(&spawned, 0);
        assert!((2..=4).contains(&launches), "{} launches", launches);
        assert!(report.failed_slots.is_empty());
    }

    #[test]
    fn test_crash_backoff_doubles_up_to_max() {
        let backoff = CrashBackoff::new(Duration::from_millis(100), Duration::from_secs(1));

        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
        assert_eq!(backoff.delay(5), Duration::from_secs(1));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_ready_line_written_once_serving() {
        let lifecycle = WorkerLifecycle::new(WorkerId::new(0, 1), RecyclePolicy::default());
        lifecycle.mark_serving_with_threshold(None);

        let mut out = Vec::new();
        assert!(announce_ready(&lifecycle, &mut out).await.unwrap());
        assert_eq!(out, format!("{}\n", READY_LINE).into_bytes());
    }

    #[tokio::test]
    async fn test_no_ready_line_after_startup_failure() {
        let lifecycle = WorkerLifecycle::new(WorkerId::new(0, 1), RecyclePolicy::default());
        let _ = lifecycle.mark_startup_failed("cannot adopt listener");

        let mut out = Vec::new();
        assert!(!announce_ready(&lifecycle, &mut out).await.unwrap());
        assert!(out.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_classification() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(
            WorkerExit::from_status(std::process::ExitStatus::from_raw(0)),
            WorkerExit::Recycled
        );
        assert!(matches!(
            WorkerExit::from_status(std::process::ExitStatus::from_raw(78 << 8)),
            WorkerExit::StartupFailed(_)
        ));
        assert!(matches!(
            WorkerExit::from_status(std::process::ExitStatus::from_raw(9)),
            WorkerExit::Crashed(_)
        ));
    }
}
