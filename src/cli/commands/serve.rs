//! Serve command - runs the worker pool or a single worker.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use leanserve::config::ConfigSnapshot;
use leanserve::pool::{announce_ready, host_cpu_count, PoolSizing, WorkerId, GENERATION_ENV};
use leanserve::server::{bind_listener, cancel_on_signals, inherited_listener, Worker};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::{CommandContext, EXIT_OK};
use crate::cli::OverrideArgs;

/// Arguments for the serve command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Run as the worker for this pool slot (set by the supervisor)
    #[arg(long, hide = true)]
    pub worker_slot: Option<usize>,
}

impl ServeArgs {
    /// Execute the serve command
    pub fn execute(&self, ctx: &CommandContext) -> Result<i32> {
        let snapshot = Arc::clone(&ctx.snapshot);

        if let Some(slot) = self.worker_slot {
            return run_pool_worker(snapshot, slot);
        }

        if snapshot.use_worker_pool() && cfg!(unix) {
            run_pool(snapshot)
        } else {
            run_single_process(snapshot)
        }
    }
}

/// Runtime for one worker, sized by `THREADS`.
fn worker_runtime(snapshot: &ConfigSnapshot) -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(snapshot.threads())
        .enable_all()
        .build()
        .context("failed to build worker runtime")
}

/// Child mode: serve on the inherited socket until recycled.
fn run_pool_worker(snapshot: Arc<ConfigSnapshot>, slot: usize) -> Result<i32> {
    let generation = std::env::var(GENERATION_ENV)
        .ok()
        .and_then(|g| g.parse().ok())
        .unwrap_or(1);
    let id = WorkerId::new(slot, generation);
    let span = info_span!("worker", worker = %id);
    let _entered = span.enter();

    let listener = match inherited_listener()? {
        Some(listener) => listener,
        None => bind_listener(&snapshot.bind_address())?,
    };
    let worker = Worker::prepare(Arc::clone(&snapshot), id)?;
    let lifecycle = Arc::clone(worker.lifecycle());

    let runtime = worker_runtime(&snapshot)?;
    runtime.block_on(async {
        let shutdown = CancellationToken::new();
        cancel_on_signals(shutdown.clone());
        tokio::spawn(async move {
            if let Err(e) = announce_ready(&lifecycle, tokio::io::stdout()).await {
                warn!(error = %e, "Cannot report readiness to the supervisor");
            }
        });
        worker
            .serve(listener, shutdown)
            .instrument(span.clone())
            .await
    })?;

    Ok(leanserve::pool::EXIT_RECYCLED)
}

/// Single-process fallback: recycling starts a fresh worker in place.
fn run_single_process(snapshot: Arc<ConfigSnapshot>) -> Result<i32> {
    info!(address = %snapshot.bind_address(), "Serving from a single process");
    let listener = bind_listener(&snapshot.bind_address())?;

    let runtime = worker_runtime(&snapshot)?;
    runtime.block_on(async {
        let shutdown = CancellationToken::new();
        cancel_on_signals(shutdown.clone());

        let mut generation = 1;
        loop {
            let id = WorkerId::new(0, generation);
            let worker = Worker::prepare(Arc::clone(&snapshot), id)?;
            worker
                .serve(listener.try_clone()?, shutdown.clone())
                .instrument(info_span!("worker", worker = %id))
                .await?;

            if shutdown.is_cancelled() {
                return Ok::<_, leanserve::Error>(());
            }
            generation += 1;
        }
    })?;

    Ok(EXIT_OK)
}

#[cfg(unix)]
fn run_pool(snapshot: Arc<ConfigSnapshot>) -> Result<i32> {
    use leanserve::pool::{ProcessSpawner, Supervisor};

    let cpus = host_cpu_count();
    let workers = PoolSizing::workers_for(&snapshot);
    info!(
        cpus,
        workers,
        threads = snapshot.threads(),
        address = %snapshot.bind_address(),
        "Sizing worker pool"
    );

    let listener = bind_listener(&snapshot.bind_address())?;
    let spawner = ProcessSpawner::current_exe(&listener)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build supervisor runtime")?;
    let report = runtime.block_on(async {
        let shutdown = CancellationToken::new();
        cancel_on_signals(shutdown.clone());
        Supervisor::new(workers, spawner).run(shutdown).await
    })?;

    if !report.failed_slots.is_empty() {
        warn!(failed = ?report.failed_slots, "Some worker slots never started");
    }
    drop(listener);
    Ok(EXIT_OK)
}

#[cfg(not(unix))]
fn run_pool(snapshot: Arc<ConfigSnapshot>) -> Result<i32> {
    run_single_process(snapshot)
}
