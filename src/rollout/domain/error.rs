//! Error types for rollout domain validation and parsing.

use super::{AuditStatus, DeploymentStatus};
use thiserror::Error;

/// Errors returned while constructing or transitioning rollout values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RolloutDomainError {
    /// The deployment name is empty after trimming.
    #[error("deployment name must not be empty")]
    EmptyDeploymentName,

    /// The deployment name exceeds the 255-character storage limit.
    #[error("deployment name exceeds 255 character limit")]
    DeploymentNameTooLong,

    /// A rollout percentage is outside `1..=100`.
    #[error("rollout percentage must be between 1 and 100, got {0}")]
    InvalidPercentage(u8),

    /// A staged rollout lists no stages.
    #[error("staged rollout requires at least one stage")]
    EmptyStages,

    /// Stage percentages do not strictly increase.
    #[error("staged rollout percentages must strictly increase")]
    StagesNotIncreasing,

    /// The deployment cannot move between the two statuses.
    #[error("deployment cannot move from {from} to {to}")]
    InvalidDeploymentTransition {
        /// Current status.
        from: DeploymentStatus,
        /// Requested status.
        to: DeploymentStatus,
    },

    /// The audit row cannot move between the two statuses.
    #[error("audit row cannot move from {from} to {to}")]
    InvalidAuditTransition {
        /// Current status.
        from: AuditStatus,
        /// Requested status.
        to: AuditStatus,
    },
}

/// A persisted rollout enumeration value is not recognised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {field}: {value}")]
pub struct ParseRolloutValueError {
    /// Which enumeration was being parsed.
    pub field: &'static str,
    /// The rejected text.
    pub value: String,
}

impl ParseRolloutValueError {
    pub(super) fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_owned(),
        }
    }
}
