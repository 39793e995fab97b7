//! Error types for Leanserve.
//!
//! This module defines the error taxonomy shared by the registry, the
//! worker lifecycle and the supervisor. Errors are classified by how far
//! they propagate:
//!
//! - [`Error::Config`] aborts startup; the process refuses to start.
//! - [`Error::Initialization`] is local to the request that triggered a
//!   lazy build; the next access retries.
//! - [`Error::WorkerStartup`] fails a single worker slot.
//! - [`Error::DrainTimeout`] is logged as a forced termination and never
//!   escalated.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::startup::ComponentKey;

/// Result type alias for Leanserve operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Shared cause of a failed component build.
///
/// Every caller waiting on the same build receives the same cause, so it is
/// reference counted rather than boxed.
pub type InitCause = Arc<dyn std::error::Error + Send + Sync>;

/// The main error type for Leanserve.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Startup Errors
    // ========================================================================
    /// A configuration value is missing, unparsable or out of range.
    #[error("Configuration error for '{key}': {message}")]
    Config {
        /// Flag or config key that failed validation
        key: String,
        /// Error message
        message: String,
    },

    /// A worker failed to reach the serving state.
    #[error("Worker slot {slot} failed to start: {reason}")]
    WorkerStartup {
        /// Pool slot of the failed worker
        slot: usize,
        /// Why startup failed
        reason: String,
    },

    // ========================================================================
    // Registry Errors
    // ========================================================================
    /// A lazy component factory failed.
    #[error("Failed to initialize component '{key}': {source}")]
    Initialization {
        /// Component whose factory failed
        key: ComponentKey,
        /// Underlying cause
        #[source]
        source: InitCause,
    },

    /// A component key was registered twice.
    #[error("Component '{0}' is already registered")]
    DuplicateComponent(ComponentKey),

    /// Registration attempted after the registry started resolving.
    #[error("Cannot register '{0}': registry is sealed after first resolve")]
    RegistrySealed(ComponentKey),

    /// No factory is registered for the key.
    #[error("Component '{0}' is not registered")]
    UnknownComponent(ComponentKey),

    /// The cached instance is not of the requested type.
    #[error("Component '{key}' is not a {expected}")]
    ComponentType {
        /// Component key
        key: ComponentKey,
        /// Requested type name
        expected: &'static str,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// A draining worker still had requests in flight at its deadline.
    #[error("Worker {worker} forced to terminate with {in_flight} request(s) in flight after {grace:?}")]
    DrainTimeout {
        /// Worker identifier
        worker: String,
        /// Requests still running at the deadline
        in_flight: usize,
        /// Grace period that elapsed
        grace: Duration,
    },

    // ========================================================================
    // I/O and Server Errors
    // ========================================================================
    /// I/O failure (binding, spawning, reading process stats).
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// HTTP server failure.
    #[error("Server error: {0}")]
    Server(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a worker startup error.
    pub fn worker_startup(slot: usize, reason: impl Into<String>) -> Self {
        Error::WorkerStartup {
            slot,
            reason: reason.into(),
        }
    }

    /// Whether this error should stop the process from starting.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::WorkerStartup { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}
