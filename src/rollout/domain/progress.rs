//! Aggregate delivery counts for a deployment.

use super::{AuditStatus, ConfigAudit};
use serde::Serialize;

/// Per-status audit row counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeploymentProgress {
    /// Rows in the ledger.
    pub total: usize,
    /// Rows awaiting the agent's next exchange.
    pub pending: usize,
    /// Rows sent or being applied.
    pub applying: usize,
    /// Rows reported running.
    pub applied: usize,
    /// Rows reported failed or withdrawn.
    pub failed: usize,
}

impl DeploymentProgress {
    /// Counts the given audit rows.
    #[must_use]
    pub fn from_audits<'a>(audits: impl IntoIterator<Item = &'a ConfigAudit>) -> Self {
        let mut progress = Self::default();
        for audit in audits {
            progress.total += 1;
            match audit.status() {
                AuditStatus::Pending => progress.pending += 1,
                AuditStatus::Applying => progress.applying += 1,
                AuditStatus::Applied => progress.applied += 1,
                AuditStatus::Failed => progress.failed += 1,
            }
        }
        progress
    }

    /// Returns `true` when every row is applied or failed.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.pending == 0 && self.applying == 0
    }

    /// Returns the share of rows applied, rounded down.
    #[must_use]
    pub fn applied_percent(&self) -> usize {
        (self.applied * 100)
            .checked_div(self.total)
            .unwrap_or_default()
    }
}
