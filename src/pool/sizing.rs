//! Worker pool sizing.
//!
//! The classic `2 * CPU + 1` heuristic trades memory for throughput. Each
//! worker here carries its own copy of every lazily built subsystem, so the
//! default policy is deliberately conservative: half a worker per core, with
//! a floor of two.

use serde::Serialize;

use crate::config::ConfigSnapshot;

/// Default workers per CPU core.
pub const DEFAULT_FRACTION: f64 = 0.5;

/// Default minimum worker count.
pub const DEFAULT_FLOOR: usize = 2;

/// Compute the number of worker processes to launch.
///
/// A positive `override_count` is returned verbatim. Otherwise the result is
/// `max(floor, round(cpu_count * fraction))`. The function never fails and
/// always returns at least one worker; a zero floor is treated as one.
///
/// # Example
///
/// ```rust
/// use leanserve::pool::size;
///
/// assert_eq!(size(4, None, 2, 0.5), 2);
/// assert_eq!(size(16, None, 2, 0.5), 8);
/// assert_eq!(size(4, Some(6), 2, 0.5), 6);
/// ```
pub fn size(cpu_count: usize, override_count: Option<usize>, floor: usize, fraction: f64) -> usize {
    if let Some(n) = override_count.filter(|&n| n > 0) {
        return n;
    }

    let floor = floor.max(1);
    let scaled = cpu_count as f64 * fraction;
    // NaN and negative products saturate to zero and fall back to the floor.
    let scaled = if scaled.is_finite() {
        scaled.round() as usize
    } else {
        0
    };

    floor.max(scaled)
}

/// Sizing policy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoolSizing {
    /// Minimum worker count
    pub floor: usize,
    /// Workers per CPU core
    pub fraction: f64,
}

impl Default for PoolSizing {
    fn default() -> Self {
        Self {
            floor: DEFAULT_FLOOR,
            fraction: DEFAULT_FRACTION,
        }
    }
}

impl PoolSizing {
    /// Worker count for a given CPU count and optional override.
    pub fn workers(&self, cpu_count: usize, override_count: Option<usize>) -> usize {
        size(cpu_count, override_count, self.floor, self.fraction)
    }

    /// Worker count for this host under the snapshot's policy.
    pub fn workers_for(snapshot: &ConfigSnapshot) -> usize {
        snapshot
            .sizing()
            .workers(host_cpu_count(), snapshot.workers_override())
    }
}

/// Number of CPUs available to this process (at least one).
pub fn host_cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_policy_on_four_cores() {
        assert_eq!(size(4, None, 2, 0.5), 2);
    }

    #[test]
    fn test_override_always_wins() {
        assert_eq!(size(4, Some(6), 2, 0.5), 6);
        assert_eq!(size(64, Some(1), 2, 0.5), 1);
    }

    #[test]
    fn test_zero_override_is_ignored() {
        assert_eq!(size(8, Some(0), 2, 0.5), 4);
    }

    #[test]
    fn test_floor_applies_on_small_hosts() {
        assert_eq!(size(1, None, 2, 0.5), 2);
        assert_eq!(size(3, None, 2, 0.5), 2);
    }

    #[test]
    fn test_zero_floor_still_yields_a_worker() {
        assert_eq!(size(1, None, 0, 0.1), 1);
    }

    #[test]
    fn test_nonsense_fraction_falls_back_to_floor() {
        assert_eq!(size(8, None, 2, f64::NAN), 2);
        assert_eq!(size(8, None, 3, -1.0), 3);
    }

    #[test]
    fn test_pool_sizing_defaults() {
        let sizing = PoolSizing::default();
        assert_eq!(sizing.workers(16, None), 8);
        assert_eq!(sizing.workers(16, Some(3)), 3);
    }

    proptest! {
        #[test]
        fn prop_default_policy_matches_formula(cpu in 1usize..4096) {
            let expected = 2usize.max((cpu as f64 * 0.5).round() as usize);
            prop_assert_eq!(size(cpu, None, 2, 0.5), expected);
        }

        #[test]
        fn prop_result_is_at_least_floor(
            cpu in 1usize..4096,
            floor in 1usize..64,
            fraction in 0.01f64..4.0,
        ) {
            let n = size(cpu, None, floor, fraction);
            prop_assert!(n >= floor);
            prop_assert!(n >= 1);
        }

        #[test]
        fn prop_positive_override_is_verbatim(cpu in 1usize..4096, n in 1usize..1024) {
            prop_assert_eq!(size(cpu, Some(n), 2, 0.5), n);
        }
    }
}
