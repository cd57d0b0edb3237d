//! Sliding-window fault detection

use crate::config::FaultPolicy;
use std::collections::VecDeque;

/// Outcomes of the most recent telegrams
///
/// Only failures that count toward the fault threshold (framing, security,
/// decode) are recorded as failures; I/O and mapping errors are left out.
#[derive(Debug, Clone)]
pub struct FaultTracker {
    threshold: usize,
    window: usize,
    /// `true` = failure, newest at the back
    outcomes: VecDeque<bool>,
    faulted: bool,
}

impl FaultTracker {
    pub fn new(policy: &FaultPolicy) -> Self {
        Self {
            threshold: policy.threshold.max(1),
            window: policy.window.max(1),
            outcomes: VecDeque::with_capacity(policy.window),
            faulted: false,
        }
    }

    /// Record a published telegram
    ///
    /// Returns `true` when this clears the faulted state. Recovery also
    /// empties the window, so the next fault needs `threshold` new failures.
    pub fn record_success(&mut self) -> bool {
        if self.faulted {
            self.reset();
            return true;
        }
        self.push(false);
        false
    }

    /// Record a dropped telegram
    ///
    /// Returns `true` when this crosses the threshold.
    pub fn record_failure(&mut self) -> bool {
        self.push(true);
        if !self.faulted && self.failures() >= self.threshold {
            self.faulted = true;
            return true;
        }
        false
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Failures within the current window
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|&&failed| failed).count()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn reset(&mut self) {
        self.outcomes.clear();
        self.faulted = false;
    }

    fn push(&mut self, failed: bool) {
        if self.outcomes.len() == self.window {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(failed);
    }
}
