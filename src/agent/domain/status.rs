//! Connection lifecycle, transport, and deployment-mode enumerations.

use super::ParseAgentValueError;
use crate::capability::AgentCapabilities;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Registered but never seen on a channel.
    NeverConnected,
    /// A channel is currently open, or the agent is polling.
    Connected,
    /// The last channel closed.
    Disconnected,
    /// The agent could not complete registration.
    Failed,
}

impl ConnectionStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NeverConnected => "never_connected",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ConnectionStatus {
    type Error = ParseAgentValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "never_connected" => Ok(Self::NeverConnected),
            "connected" => Ok(Self::Connected),
            "disconnected" => Ok(Self::Disconnected),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseAgentValueError::new("connection status", value)),
        }
    }
}

/// Channel kind the agent last used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// Persistent WebSocket channel.
    WebSocket,
    /// Single-shot HTTP requests.
    HttpPoll,
}

impl TransportType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::HttpPoll => "http_poll",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TransportType {
    type Error = ParseAgentValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "websocket" => Ok(Self::WebSocket),
            "http_poll" => Ok(Self::HttpPoll),
            _ => Err(ParseAgentValueError::new("transport type", value)),
        }
    }
}

/// How the collector is run on its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// The agent has not said.
    #[default]
    Unknown,
    /// The collector speaks OpAMP itself through its extension.
    Extension,
    /// An external supervisor process speaks OpAMP for the collector.
    Supervisor,
}

impl DeploymentMode {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Extension => "extension",
            Self::Supervisor => "supervisor",
        }
    }

    /// Capability set assumed when an agent in this mode reports none.
    ///
    /// Supervisors have been observed sending an all-zero capability field
    /// even though they always implement this set. The result is an
    /// inference and is flagged as such wherever it is stored.
    #[must_use]
    pub const fn inferred_capabilities(self) -> Option<AgentCapabilities> {
        match self {
            Self::Supervisor => Some(
                AgentCapabilities::REPORTS_STATUS
                    .union(AgentCapabilities::ACCEPTS_REMOTE_CONFIG)
                    .union(AgentCapabilities::REPORTS_EFFECTIVE_CONFIG)
                    .union(AgentCapabilities::REPORTS_OWN_METRICS)
                    .union(AgentCapabilities::ACCEPTS_RESTART_COMMAND)
                    .union(AgentCapabilities::REPORTS_HEALTH)
                    .union(AgentCapabilities::REPORTS_REMOTE_CONFIG)
                    .union(AgentCapabilities::REPORTS_HEARTBEAT),
            ),
            Self::Unknown | Self::Extension => None,
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for DeploymentMode {
    type Error = ParseAgentValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unknown" | "" => Ok(Self::Unknown),
            "extension" => Ok(Self::Extension),
            "supervisor" => Ok(Self::Supervisor),
            _ => Err(ParseAgentValueError::new("deployment mode", value)),
        }
    }
}
