//! Simulation metrics.

use std::collections::VecDeque;

use fxpair_fx::StoreStats;

/// Simulation metrics.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    /// Engine operations performed.
    pub operations: u64,
    /// Assertions that held.
    pub assertions_passed: u64,
    /// Assertions that did not hold.
    pub assertions_failed: u64,
    /// Store counters at the end of the run.
    pub store: StoreStats,
    /// Time from issuing fetches to settling them (ms).
    settle_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            operations: 0,
            assertions_passed: 0,
            assertions_failed: 0,
            store: StoreStats::default(),
            settle_samples: VecDeque::with_capacity(1000),
            max_samples: 1000,
        }
    }

    /// Record an engine operation.
    pub fn record_operation(&mut self) {
        self.operations += 1;
    }

    /// Record an assertion result.
    pub fn record_assertion(&mut self, passed: bool) {
        if passed {
            self.assertions_passed += 1;
        } else {
            self.assertions_failed += 1;
        }
    }

    /// Record how long a settle took.
    pub fn record_settle(&mut self, millis: u64) {
        if self.settle_samples.len() >= self.max_samples {
            self.settle_samples.pop_front();
        }
        self.settle_samples.push_back(millis);
    }

    /// Get average settle time in ms.
    pub fn average_settle_ms(&self) -> u64 {
        if self.settle_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.settle_samples.iter().sum();
        sum / self.settle_samples.len() as u64
    }

    /// Share of settled fetches that were dropped as stale.
    pub fn discard_rate(&self) -> f64 {
        let settled = self.store.applied + self.store.failed + self.store.discarded;
        if settled == 0 {
            return 0.0;
        }

        self.store.discarded as f64 / settled as f64
    }

    /// Check if every assertion held.
    pub fn all_passed(&self) -> bool {
        self.assertions_failed == 0
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
