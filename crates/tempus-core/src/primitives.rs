//! # Innate Primitives
//!
//! Hardcoded numeric constants shared by every component of the planner.
//!
//! All values in a temporal state are `f64`. Discrete values are stored as
//! small integers inside the same vector, so every comparison between state
//! values goes through [`double_equals`] rather than `==`.

/// Tolerance for comparing two state values or two time points.
///
/// Two values `a` and `b` are considered equal iff `|a - b| < EPSILON`.
pub const EPSILON: f64 = 1e-5;

/// Length of one internal time step.
///
/// When epsilonisation is enabled, applying an operator advances the clock by
/// this amount so that no two happenings share a time point.
pub const EPS_TIME: f64 = 0.01;

/// Largest representable value; used as "unbounded" for makespans and
/// next-happening searches.
pub const REALLY_BIG: f64 = f64::MAX;

/// Smallest representable value; used as the neutral element for running
/// maxima such as the heuristic waiting time.
pub const REALLY_SMALL: f64 = -f64::MAX;

/// Cost assigned to local-problem nodes that have not been reached yet.
pub const QUITE_A_LOT: f64 = 10_000_000.0;

/// Heuristic value reported for states from which the goal is unreachable.
pub const DEAD_END: f64 = -1.0;

/// "Infinite" distance in the simple temporal network.
pub const STN_INFINITY: f64 = 10_000_000.0;

// =============================================================================
// SEARCH CONTROL
// =============================================================================

/// Number of search steps without progress after which a stagnating search
/// is restarted (only when restarts are enabled).
pub const STAGNATION_STEPS: u64 = 5000;

/// Priority bonus given to an open list whenever a state popped from it
/// improves the best known heuristic value.
pub const PROGRESS_REWARD: i64 = 1000;

/// Priority bonus given to the open list a restarted search begins with.
pub const RESTART_BOOST: i64 = 5000;

/// Interval between two statistics dumps of a verbose search, in seconds.
pub const STATISTICS_INTERVAL_SECS: u64 = 10;

/// Offset added to the blind-heuristic or cost estimate of a state that is
/// not yet a goal but whose remaining work is only waiting for running
/// operators.
pub const RUNNING_OPERATORS_OFFSET: f64 = 0.9;

/// Weight of the cost estimate in the weighted makespan mode.
pub const WEIGHTED_COST_FACTOR: f64 = 0.2;

/// Seed of the generator that samples goals in random preferred-operator mode.
pub const PREFERRED_SAMPLE_SEED: u64 = 1;

// =============================================================================
// NUMERIC HELPERS
// =============================================================================

/// Epsilon-tolerant equality of two state values.
#[must_use]
pub fn double_equals(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// Epsilon-tolerant equality of two optional values; `None` only equals `None`.
#[must_use]
pub fn optional_equals(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => double_equals(x, y),
        (None, None) => true,
        _ => false,
    }
}

// =============================================================================
// TESTS
// =============================================================================
