//! # Search Statistics
//!
//! Children generated per open list and expansion, summarized as branching
//! factors. Dumped through `tracing` and serializable for JSON reports.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// Running mean / min / max of a measured quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunningStat {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    /// Mean of the measurements, 0 if there are none.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Counters of one search run.
#[derive(Debug, Clone, Serialize)]
pub struct SearchStatistics {
    pub generated: u64,
    /// Branching factor per open-list index.
    pub branching_by_open_list: BTreeMap<usize, RunningStat>,
    pub branching: RunningStat,
    #[serde(skip)]
    pending: BTreeMap<usize, u64>,
    #[serde(skip)]
    last_dump: Option<(Instant, u64, u64)>,
    #[serde(skip)]
    started: Instant,
}

impl Default for SearchStatistics {
    fn default() -> Self {
        Self {
            generated: 0,
            branching_by_open_list: BTreeMap::new(),
            branching: RunningStat::default(),
            pending: BTreeMap::new(),
            last_dump: None,
            started: Instant::now(),
        }
    }
}

impl SearchStatistics {
    /// One child was pushed to open list `open_list`.
    pub fn count_child(&mut self, open_list: usize) {
        self.generated += 1;
        *self.pending.entry(open_list).or_default() += 1;
    }

    /// Close the current expansion and fold its child counts into the
    /// branching factors.
    pub fn finish_expansion(&mut self) {
        let mut children = 0;
        for (&open_list, count) in &mut self.pending {
            self.branching_by_open_list
                .entry(open_list)
                .or_default()
                .add(*count as f64);
            children += *count;
            *count = 0;
        }
        self.branching.add(children as f64);
    }

    /// Log rates since the last dump and the branching factors.
    pub fn dump(&mut self, expanded: u64) {
        let now = Instant::now();
        let (since, last_expanded, last_generated) =
            self.last_dump.unwrap_or((self.started, 0, 0));
        let window = now.duration_since(since).as_secs_f64().max(f64::EPSILON);
        let total = now.duration_since(self.started).as_secs_f64().max(f64::EPSILON);

        tracing::info!(
            expanded,
            rate = format!("{:.1}", (expanded - last_expanded) as f64 / window),
            average = format!("{:.1}", expanded as f64 / total),
            "expanded states"
        );
        tracing::info!(
            generated = self.generated,
            rate = format!("{:.1}", (self.generated - last_generated) as f64 / window),
            average = format!("{:.1}", self.generated as f64 / total),
            "generated states"
        );
        tracing::info!(
            mean = self.branching.mean(),
            min = self.branching.min.unwrap_or(0.0),
            max = self.branching.max.unwrap_or(0.0),
            "overall branching factor"
        );
        for (open_list, stat) in &self.branching_by_open_list {
            tracing::info!(
                open_list,
                mean = stat.mean(),
                min = stat.min.unwrap_or(0.0),
                max = stat.max.unwrap_or(0.0),
                "branching factor"
            );
        }
        self.last_dump = Some((now, expanded, self.generated));
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branching_factor_per_expansion() {
        let mut stats = SearchStatistics::default();
        stats.count_child(0);
        stats.count_child(0);
        stats.count_child(1);
        stats.finish_expansion();
        stats.count_child(1);
        stats.finish_expansion();

        assert_eq!(stats.generated, 4);
        assert_eq!(stats.branching.count, 2);
        assert_eq!(stats.branching.mean(), 2.0);
        assert_eq!(stats.branching.min, Some(1.0));
        assert_eq!(stats.branching.max, Some(3.0));

        let first = stats.branching_by_open_list[&0];
        assert_eq!(first.min, Some(0.0));
        assert_eq!(first.max, Some(2.0));
        assert_eq!(stats.branching_by_open_list[&1].mean(), 1.0);
    }

    #[test]
    fn empty_stat_has_zero_mean() {
        assert_eq!(RunningStat::default().mean(), 0.0);
    }
}
