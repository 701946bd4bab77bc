//! Snapshots of what an agent last said about itself.

use super::{DeploymentMode, ParseAgentValueError};
use crate::pipeline::domain::ConfigHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute naming the collector service.
pub const SERVICE_NAME_ATTRIBUTE: &str = "service.name";
/// Attribute naming the deployment mode.
pub const DEPLOYMENT_MODE_ATTRIBUTE: &str = "fleet.deployment.mode";

/// Agent-reported state of the remote configuration it was offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteConfigStatus {
    /// The agent has not reported on any offered configuration.
    Unset,
    /// The agent is applying the configuration.
    Applying,
    /// The configuration is running.
    Applied,
    /// The configuration could not be applied.
    Failed,
}

impl RemoteConfigStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RemoteConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RemoteConfigStatus {
    type Error = ParseAgentValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unset" => Ok(Self::Unset),
            "applying" => Ok(Self::Applying),
            "applied" => Ok(Self::Applied),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseAgentValueError::new("remote config status", value)),
        }
    }
}

/// Last remote-config status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfigState {
    /// Reported status.
    pub status: RemoteConfigStatus,
    /// Hash of the configuration the report refers to, when sent.
    pub hash: Option<ConfigHash>,
    /// Agent-supplied failure detail.
    pub error_message: Option<String>,
    /// When the report arrived.
    pub reported_at: DateTime<Utc>,
}

/// Configuration the agent reports it is actually running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    /// Hash of `content`.
    pub hash: ConfigHash,
    /// Raw configuration text as reported.
    pub content: String,
    /// When the report arrived.
    pub reported_at: DateTime<Utc>,
}

/// Component health as last reported by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedHealth {
    /// Overall health flag.
    pub healthy: bool,
    /// Free-form status text.
    pub status: String,
    /// Most recent error, if any.
    pub last_error: Option<String>,
    /// Health flag per named component.
    pub components: BTreeMap<String, bool>,
    /// When the report arrived.
    pub reported_at: DateTime<Utc>,
}

/// Flattened agent description attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentDescription {
    /// Attributes that identify the agent.
    pub identifying: BTreeMap<String, String>,
    /// Attributes that describe the host and environment.
    pub non_identifying: BTreeMap<String, String>,
}

impl AgentDescription {
    /// Returns the non-blank `service.name` attribute.
    #[must_use]
    pub fn service_name(&self) -> Option<&str> {
        self.attribute(SERVICE_NAME_ATTRIBUTE)
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Returns the declared deployment mode, defaulting to unknown.
    #[must_use]
    pub fn deployment_mode(&self) -> DeploymentMode {
        self.attribute(DEPLOYMENT_MODE_ATTRIBUTE)
            .and_then(|mode| DeploymentMode::try_from(mode).ok())
            .unwrap_or_default()
    }

    /// Looks an attribute up, identifying attributes first.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.identifying
            .get(key)
            .or_else(|| self.non_identifying.get(key))
            .map(String::as_str)
    }
}
