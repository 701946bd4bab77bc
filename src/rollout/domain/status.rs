//! Deployment and audit lifecycle statuses.

use super::ParseRolloutValueError;
use crate::agent::domain::RemoteConfigStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a deployment.
///
/// `pending → in_progress → completed | failed | rolled_back`; rollback is
/// also permitted from the other terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Created; targets not yet stamped.
    Pending,
    /// Targets stamped; agents are pulling.
    InProgress,
    /// Every row is terminal and at least one applied.
    Completed,
    /// Every row is terminal and none applied.
    Failed,
    /// Withdrawn by an operator.
    RolledBack,
}

impl DeploymentStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Returns `true` when the lifecycle permits moving to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress | Self::Completed)
                | (Self::InProgress, Self::Completed | Self::Failed)
                | (
                    Self::Pending | Self::InProgress | Self::Completed | Self::Failed,
                    Self::RolledBack
                )
        )
    }

    /// Returns `true` for statuses that accept new targets.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for DeploymentStatus {
    type Error = ParseRolloutValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "rolled_back" => Ok(Self::RolledBack),
            _ => Err(ParseRolloutValueError::new("deployment status", value)),
        }
    }
}

/// Delivery state of one (deployment, agent) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Waiting for the agent's next exchange.
    Pending,
    /// Sent, or reported as being applied.
    Applying,
    /// Reported running by the agent.
    Applied,
    /// Reported failed by the agent, or withdrawn by rollback.
    Failed,
}

impl AuditStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` once no further agent report is expected.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Failed)
    }

    /// Maps an agent-reported status onto the ledger.
    ///
    /// `Unset` carries no delivery information and maps to `None`.
    #[must_use]
    pub const fn from_reported(status: RemoteConfigStatus) -> Option<Self> {
        match status {
            RemoteConfigStatus::Unset => None,
            RemoteConfigStatus::Applying => Some(Self::Applying),
            RemoteConfigStatus::Applied => Some(Self::Applied),
            RemoteConfigStatus::Failed => Some(Self::Failed),
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AuditStatus {
    type Error = ParseRolloutValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "applying" => Ok(Self::Applying),
            "applied" => Ok(Self::Applied),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseRolloutValueError::new("audit status", value)),
        }
    }
}
