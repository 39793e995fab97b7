//! Startup timing metrics for worker bootstrap.
//!
//! Each worker times the phases between process start and accepting its
//! first request, and logs the breakdown once it is serving.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

/// Phases of worker startup that can be timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupPhase {
    /// Deciding which route groups to mount
    RouteMounting,
    /// Registering lazy component factories
    ComponentRegistration,
    /// Eager construction when lazy loading is disabled
    Prewarm,
    /// Binding or adopting the listening socket
    Bind,
}

impl std::fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupPhase::RouteMounting => write!(f, "Route Mounting"),
            StartupPhase::ComponentRegistration => write!(f, "Component Registration"),
            StartupPhase::Prewarm => write!(f, "Prewarm"),
            StartupPhase::Bind => write!(f, "Bind"),
        }
    }
}

/// Metrics for a single phase.
#[derive(Debug, Clone, Default)]
pub struct PhaseMetrics {
    start: Option<Instant>,
    duration: Duration,
    completed: bool,
}

impl PhaseMetrics {
    /// Get the duration of this phase.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Check if this phase completed.
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

/// Startup metrics collector.
///
/// # Example
///
/// ```rust
/// use leanserve::startup::{StartupMetrics, StartupPhase};
///
/// let mut metrics = StartupMetrics::new();
/// let plan = metrics.measure(StartupPhase::RouteMounting, || "plan");
/// metrics.finish();
///
/// assert_eq!(plan, "plan");
/// assert!(metrics.get_phase(&StartupPhase::RouteMounting).unwrap().is_completed());
/// ```
#[derive(Debug)]
pub struct StartupMetrics {
    phases: HashMap<StartupPhase, PhaseMetrics>,
    overall_start: Instant,
    overall_end: Option<Instant>,
}

impl Default for StartupMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StartupMetrics {
    /// Create a new metrics collector; the overall clock starts now.
    pub fn new() -> Self {
        Self {
            phases: HashMap::new(),
            overall_start: Instant::now(),
            overall_end: None,
        }
    }

    /// Start timing a phase.
    pub fn start_phase(&mut self, phase: StartupPhase) {
        let metrics = self.phases.entry(phase).or_default();
        metrics.start = Some(Instant::now());
        metrics.completed = false;
    }

    /// End timing a phase.
    pub fn end_phase(&mut self, phase: StartupPhase) {
        if let Some(metrics) = self.phases.get_mut(&phase) {
            if let Some(start) = metrics.start {
                metrics.duration = start.elapsed();
                metrics.completed = true;
            }
        }
    }

    /// Measure a phase using a closure.
    pub fn measure<T, F>(&mut self, phase: StartupPhase, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.start_phase(phase);
        let result = f();
        self.end_phase(phase);
        result
    }

    /// Mark the end of overall startup.
    pub fn finish(&mut self) {
        self.overall_end = Some(Instant::now());
    }

    /// Get metrics for a specific phase.
    pub fn get_phase(&self, phase: &StartupPhase) -> Option<&PhaseMetrics> {
        self.phases.get(phase)
    }

    /// Get the total startup duration.
    pub fn total_duration(&self) -> Duration {
        match self.overall_end {
            Some(end) => end.duration_since(self.overall_start),
            None => self.overall_start.elapsed(),
        }
    }

    /// Completed phases sorted by duration (descending).
    pub fn sorted_phases(&self) -> Vec<(StartupPhase, Duration)> {
        let mut phases: Vec<_> = self
            .phases
            .iter()
            .filter(|(_, m)| m.completed)
            .map(|(p, m)| (*p, m.duration))
            .collect();
        phases.sort_by(|a, b| b.1.cmp(&a.1));
        phases
    }

    /// Log the timing breakdown at debug level.
    pub fn report(&self) {
        for (phase, duration) in self.sorted_phases() {
            debug!(
                phase = %phase,
                elapsed_ms = duration.as_secs_f64() * 1000.0,
                "Startup phase"
            );
        }
        debug!(
            total_ms = self.total_duration().as_secs_f64() * 1000.0,
            "Worker startup complete"
        );
    }
}
