//! # Simple Temporal Network
//!
//! Difference constraints `lower <= t_to - t_from <= upper` over a set of
//! timepoints plus a fixed origin `X0`, solved by Floyd–Warshall on the
//! distance graph.
//!
//! The entry `dist[from][to]` bounds `t_to - t_from` from above. After
//! solving, `-dist[i][X0]` is the earliest time timepoint `i` can happen.

use crate::primitives::STN_INFINITY;

/// A simple temporal network over `n` timepoints and the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleTemporalNetwork {
    size: usize,
    dist: Vec<Vec<f64>>,
}

fn add(a: f64, b: f64) -> f64 {
    if a >= STN_INFINITY || b >= STN_INFINITY || a + b >= STN_INFINITY {
        STN_INFINITY
    } else {
        a + b
    }
}

impl SimpleTemporalNetwork {
    /// Network with `timepoints` unconstrained timepoints.
    #[must_use]
    pub fn new(timepoints: usize) -> Self {
        let size = timepoints + 1;
        let mut dist = vec![vec![STN_INFINITY; size]; size];
        for (i, row) in dist.iter_mut().enumerate() {
            row[i] = 0.0;
        }
        Self { size, dist }
    }

    /// Index of the origin `X0`.
    #[must_use]
    pub const fn origin(&self) -> usize {
        self.size - 1
    }

    fn set_distance(&mut self, from: usize, to: usize, distance: f64) {
        debug_assert_ne!(from, to);
        let entry = &mut self.dist[from][to];
        if distance < *entry {
            *entry = distance;
        }
    }

    /// Require `lower <= t_to - t_from <= upper`.
    pub fn set_interval(&mut self, from: usize, to: usize, lower: f64, upper: f64) {
        self.set_distance(from, to, upper);
        self.set_distance(to, from, -lower);
    }

    /// Require `t_to - t_from == value`.
    pub fn set_singleton_interval(&mut self, from: usize, to: usize, value: f64) {
        self.set_interval(from, to, value, value);
    }

    /// Require `t_to - t_from >= lower`.
    pub fn set_unbounded_interval(&mut self, from: usize, to: usize, lower: f64) {
        self.set_interval(from, to, lower, STN_INFINITY);
    }

    /// Require `t_to >= lower`.
    pub fn set_unbounded_interval_from_origin(&mut self, to: usize, lower: f64) {
        self.set_unbounded_interval(self.origin(), to, lower);
    }

    /// Tighten every distance to the shortest path.
    pub fn solve(&mut self) {
        for k in 0..self.size {
            for i in 0..self.size {
                let via = self.dist[i][k];
                if via >= STN_INFINITY {
                    continue;
                }
                for j in 0..self.size {
                    let candidate = add(via, self.dist[k][j]);
                    if candidate < self.dist[i][j] {
                        self.dist[i][j] = candidate;
                    }
                }
            }
        }
    }

    /// False if the solved network has a negative cycle.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        (0..self.size).all(|i| self.dist[i][i] >= 0.0)
    }

    /// Latest earliest-time over all timepoints of the solved network.
    #[must_use]
    pub fn tightest_makespan(&self) -> f64 {
        let origin = self.origin();
        let min = (0..origin)
            .map(|i| self.dist[i][origin])
            .fold(0.0, f64::min);
        -min
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_actions_add_up() {
        // a: [0,1], b: [2,3], b starts after a ends.
        let mut stn = SimpleTemporalNetwork::new(4);
        for i in 0..4 {
            stn.set_unbounded_interval_from_origin(i, 0.0);
        }
        stn.set_singleton_interval(0, 1, 2.0);
        stn.set_singleton_interval(2, 3, 3.0);
        stn.set_unbounded_interval(1, 2, 0.5);
        stn.solve();
        assert!(stn.is_consistent());
        assert_eq!(stn.tightest_makespan(), 5.5);
    }

    #[test]
    fn parallel_actions_take_the_longest() {
        let mut stn = SimpleTemporalNetwork::new(4);
        for i in 0..4 {
            stn.set_unbounded_interval_from_origin(i, 0.0);
        }
        stn.set_singleton_interval(0, 1, 2.0);
        stn.set_singleton_interval(2, 3, 3.0);
        stn.solve();
        assert_eq!(stn.tightest_makespan(), 3.0);
    }

    #[test]
    fn contradiction_is_inconsistent() {
        let mut stn = SimpleTemporalNetwork::new(2);
        stn.set_interval(0, 1, 2.0, 3.0);
        stn.set_interval(1, 0, 0.0, 1.0);
        stn.solve();
        assert!(!stn.is_consistent());
    }

    #[test]
    fn tighter_bound_wins() {
        let mut stn = SimpleTemporalNetwork::new(2);
        stn.set_unbounded_interval_from_origin(0, 0.0);
        stn.set_unbounded_interval(0, 1, 1.0);
        stn.set_unbounded_interval(0, 1, 4.0);
        stn.solve();
        assert_eq!(stn.tightest_makespan(), 4.0);
    }

    #[test]
    fn empty_network_has_zero_makespan() {
        let mut stn = SimpleTemporalNetwork::new(0);
        stn.solve();
        assert_eq!(stn.tightest_makespan(), 0.0);
    }
}
