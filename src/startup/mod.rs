//! Startup optimization module for Leanserve.
//!
//! This module provides:
//! - The lazy component registry that defers construction of heavy
//!   subsystems until a request first needs them
//! - Startup timing metrics for worker bootstrap
//!
//! # Architecture
//!
//! ```text
//! Worker Startup:
//!
//! 1. Config Resolution   - snapshot received from the supervisor's flags
//! 2. Route Mounting      - decide which optional groups exist at all
//! 3. Registration        - factories only, for mounted groups only
//! 4. Prewarm             - skipped unless lazy loading is disabled
//! 5. Serving             - components built on first request
//! ```
//!
//! Every worker process owns its own registry; nothing is shared across
//! processes, so each worker pays its own first-use cost.

pub mod lazy_registry;
pub mod metrics;

pub use lazy_registry::{
    BoxError, ComponentKey, ComponentState, Instance, LazyComponentRegistry, RegistryStats,
};
pub use metrics::{PhaseMetrics, StartupMetrics, StartupPhase};
