//! Rollout strategies and their stage percentages.

use super::RolloutDomainError;
use serde::{Deserialize, Serialize};

const FULL: u8 = 100;

/// How a deployment reaches its eligible agents.
///
/// Every strategy is a sequence of cumulative percentages over one
/// deterministic ordering of the eligible agents, so each stage's cohort
/// contains the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RolloutStrategy {
    /// Every eligible agent at once.
    Immediate,
    /// A percentage first, then everyone.
    Canary {
        /// Share of eligible agents in the first cohort.
        percentage: u8,
    },
    /// Operator-defined cumulative percentages, then everyone.
    Staged {
        /// Strictly increasing percentages.
        stages: Vec<u8>,
    },
}

impl RolloutStrategy {
    /// Creates a canary strategy.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutDomainError::InvalidPercentage`] outside `1..=100`.
    pub fn canary(percentage: u8) -> Result<Self, RolloutDomainError> {
        check_percentage(percentage)?;
        Ok(Self::Canary { percentage })
    }

    /// Creates a staged strategy.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutDomainError`] when the list is empty, a percentage is
    /// outside `1..=100`, or the list does not strictly increase.
    pub fn staged(stages: Vec<u8>) -> Result<Self, RolloutDomainError> {
        let strategy = Self::Staged { stages };
        strategy.validate()?;
        Ok(strategy)
    }

    /// Checks the invariants of a strategy built directly or deserialised.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), RolloutDomainError> {
        match self {
            Self::Immediate => Ok(()),
            Self::Canary { percentage } => check_percentage(*percentage),
            Self::Staged { stages } => {
                if stages.is_empty() {
                    return Err(RolloutDomainError::EmptyStages);
                }
                for percentage in stages {
                    check_percentage(*percentage)?;
                }
                if stages.windows(2).any(|pair| matches!(pair, [a, b] if a >= b)) {
                    return Err(RolloutDomainError::StagesNotIncreasing);
                }
                Ok(())
            }
        }
    }

    /// Returns the cumulative percentage of every stage, ending at 100.
    #[must_use]
    pub fn stage_percentages(&self) -> Vec<u8> {
        let mut stages = match self {
            Self::Immediate => Vec::new(),
            Self::Canary { percentage } => vec![*percentage],
            Self::Staged { stages } => stages.clone(),
        };
        if stages.last() != Some(&FULL) {
            stages.push(FULL);
        }
        stages
    }

    /// Returns the cumulative percentage of stage `index`, if it exists.
    #[must_use]
    pub fn stage_percentage(&self, index: usize) -> Option<u8> {
        self.stage_percentages().get(index).copied()
    }

    /// Returns the index of the last stage.
    #[must_use]
    pub fn final_stage(&self) -> usize {
        self.stage_percentages().len().saturating_sub(1)
    }

    /// Returns the canonical strategy name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Canary { .. } => "canary",
            Self::Staged { .. } => "staged",
        }
    }
}

const fn check_percentage(percentage: u8) -> Result<(), RolloutDomainError> {
    if percentage == 0 || percentage > FULL {
        return Err(RolloutDomainError::InvalidPercentage(percentage));
    }
    Ok(())
}
