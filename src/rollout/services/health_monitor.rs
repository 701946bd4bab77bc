//! Canary cohort health evaluation.

use crate::agent::domain::{Agent, RemoteConfigStatus};
use crate::pipeline::domain::ConfigHash;
use serde::Serialize;

/// Minimum success share a cohort must reach before a rollout expands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthGate {
    min_success_percent: u8,
}

impl HealthGate {
    /// Creates a gate; values above 100 are clamped.
    #[must_use]
    pub fn new(min_success_percent: u8) -> Self {
        Self {
            min_success_percent: min_success_percent.min(100),
        }
    }

    /// Returns the required success percentage.
    #[must_use]
    pub const fn min_success_percent(self) -> u8 {
        self.min_success_percent
    }
}

/// Outcome of evaluating a cohort against a [`HealthGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CanaryHealthReport {
    /// Agents evaluated.
    pub cohort_size: usize,
    /// Agents reporting the configuration applied.
    pub succeeded: usize,
    /// Agents reporting the configuration failed.
    pub failed: usize,
    /// Agents that have not reported on the configuration yet.
    pub pending: usize,
    /// Threshold the cohort was held to.
    pub min_success_percent: u8,
    /// Whether the threshold was met.
    pub passed: bool,
}

/// Judges a cohort by each agent's own remote-config report.
#[derive(Debug, Clone, Copy)]
pub struct CanaryHealthMonitor {
    gate: HealthGate,
}

impl CanaryHealthMonitor {
    /// Creates a monitor holding cohorts to `gate`.
    #[must_use]
    pub const fn new(gate: HealthGate) -> Self {
        Self { gate }
    }

    /// Counts the cohort's reports for `hash` and applies the gate.
    ///
    /// Only a report naming `hash` counts; an agent still reporting an older
    /// configuration is pending. An empty cohort passes.
    #[must_use]
    pub fn evaluate(&self, hash: ConfigHash, cohort: &[Agent]) -> CanaryHealthReport {
        let mut report = CanaryHealthReport {
            cohort_size: cohort.len(),
            succeeded: 0,
            failed: 0,
            pending: 0,
            min_success_percent: self.gate.min_success_percent(),
            passed: false,
        };
        for agent in cohort {
            let status = agent
                .remote_config()
                .filter(|state| state.hash == Some(hash))
                .map(|state| state.status);
            match status {
                Some(RemoteConfigStatus::Applied) => report.succeeded += 1,
                Some(RemoteConfigStatus::Failed) => report.failed += 1,
                _ => report.pending += 1,
            }
        }
        let achieved = report.succeeded.saturating_mul(100);
        let required = report
            .cohort_size
            .saturating_mul(usize::from(report.min_success_percent));
        report.passed = achieved >= required;
        report
    }
}
