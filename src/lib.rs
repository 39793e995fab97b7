//! # Leanserve - A Memory-Conscious Serving Core
//!
//! Leanserve governs how a long-running request-serving process starts up
//! cheaply and how it scales its worker processes under memory pressure.
//!
//! ## Core Concepts
//!
//! - **Config Snapshot**: flags resolved once at process start and never mutated
//! - **Lazy Components**: heavy subsystems built on first genuine use, never at import
//! - **Route Groups**: optional HTTP surfaces mounted only when their gates hold
//! - **Worker Pool**: CPU-derived worker count, conservative by default
//! - **Recycling**: each worker drains and is replaced after a jittered request budget
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           CLI Interface                             │
//! │                 (serve / plan, clap-based parsing)                  │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                 Config layering → ConfigSnapshot                    │
//! │            (defaults, file, environment, CLI overrides)             │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                   Supervisor (pool::supervisor)                     │
//! │        size() workers, refill recycled and crashed slots            │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │  one process per slot
//!          ┌─────────────────────────┼─────────────────────────┐
//!          ▼                         ▼                         ▼
//! ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────────┐
//! │   Mount Plan    │   │   Lazy Registry     │   │  Worker Lifecycle   │
//! │ (route groups)  │   │ (build on 1st use)  │   │ (count, drain)      │
//! └─────────────────┘   └─────────────────────┘   └─────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust
//! use std::sync::Arc;
//! use leanserve::prelude::*;
//!
//! let snapshot = Arc::new(ConfigSnapshot::default());
//! let plan = MountPlan::resolve(&snapshot);
//! let registry = LazyComponentRegistry::new();
//! plan.register_components(&registry, &snapshot).unwrap();
//!
//! // Nothing is built until a request needs it.
//! assert_eq!(registry.instantiated_count(), 0);
//! assert!(size(4, None, 2, 0.5) >= 2);
//! ```

#![warn(clippy::all)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types.

    // Configuration
    pub use crate::config::{CliOverrides, Config, ConfigSnapshot, FlagValue};

    // Error handling
    pub use crate::error::{Error, Result};

    // Lazy initialization
    pub use crate::startup::{ComponentKey, ComponentState, LazyComponentRegistry};

    // Worker pool
    pub use crate::pool::{
        size, PoolSizing, RecyclePolicy, Supervisor, WorkerId, WorkerLifecycle, WorkerState,
    };

    // Serving
    pub use crate::server::{MountPlan, RouteGroup, Worker};
}

// ============================================================================
// Core
// ============================================================================

/// Error types shared across the crate.
pub mod error;

pub use error::{Error, Result};

/// Layered configuration and the immutable snapshot.
pub mod config;

/// Lazy component registry and startup timing.
pub mod startup;

// ============================================================================
// Serving
// ============================================================================

/// Deferred subsystems: vector store, embeddings and feature engines.
pub mod components;

/// Worker HTTP server and conditional route mounting.
pub mod server;

/// Worker pool sizing, lifecycle and supervision.
pub mod pool;

/// Returns the current version of Leanserve.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
