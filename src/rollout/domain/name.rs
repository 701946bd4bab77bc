//! Operator-facing deployment name.

use super::RolloutDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_NAME_LEN: usize = 255;

/// Trimmed, non-empty deployment name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeploymentName(String);

impl DeploymentName {
    /// Validates a deployment name.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutDomainError`] when the name is blank or too long.
    pub fn new(value: impl AsRef<str>) -> Result<Self, RolloutDomainError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(RolloutDomainError::EmptyDeploymentName);
        }
        if trimmed.chars().count() > MAX_NAME_LEN {
            return Err(RolloutDomainError::DeploymentNameTooLong);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the name text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeploymentName {
    type Error = RolloutDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeploymentName> for String {
    fn from(name: DeploymentName) -> Self {
        name.0
    }
}

impl fmt::Display for DeploymentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
