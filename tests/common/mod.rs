//! Shared test utilities for the Leanserve test suite.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use leanserve::config::{Config, ConfigSnapshot};
use leanserve::pool::{WorkerId, WorkerLifecycle, WorkerState};
use leanserve::server::{bind_listener, Worker};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Resolve a snapshot from the defaults with `edit` applied.
pub fn snapshot_with(edit: impl FnOnce(&mut Config)) -> Arc<ConfigSnapshot> {
    let mut config = Config::default();
    edit(&mut config);
    Arc::new(config.resolve().expect("test configuration should validate"))
}

/// A worker serving on an ephemeral local port.
pub struct TestWorker {
    pub base_url: String,
    pub lifecycle: Arc<WorkerLifecycle>,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<leanserve::Result<()>>,
}

impl TestWorker {
    /// Prepare and start a worker, returning once it accepts requests.
    pub async fn start(snapshot: Arc<ConfigSnapshot>) -> Self {
        let worker = Worker::prepare(snapshot, WorkerId::new(0, 1)).expect("worker should prepare");
        let lifecycle = Arc::clone(worker.lifecycle());

        let listener = bind_listener("127.0.0.1:0").expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local address");
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.serve(listener, shutdown.clone()));

        wait_for_state(&lifecycle, WorkerState::Serving).await;

        Self {
            base_url: format!("http://{}", addr),
            lifecycle,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Cancel the worker and wait for `serve` to return.
    pub async fn stop(self) -> leanserve::Result<()> {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("worker should stop within the timeout")
            .expect("worker task should not panic")
    }
}

/// Poll until the lifecycle reaches `state`.
pub async fn wait_for_state(lifecycle: &WorkerLifecycle, state: WorkerState) {
    for _ in 0..500 {
        if lifecycle.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "worker never reached {:?}; it is {:?}",
        state,
        lifecycle.state()
    );
}

/// HTTP client that does not reuse connections between requests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .expect("client should build")
}
