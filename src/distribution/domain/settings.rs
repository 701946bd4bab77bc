//! Connection-settings offers and per-agent apply records.

use super::{Delivery, DistributionDomainError, LedgerStatus, ParseDistributionValueError};
use crate::agent::domain::{AgentId, OrgId};
use crate::pipeline::domain::ConfigHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Apply state of connection settings on one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsStatus {
    /// Nothing offered.
    Unset,
    /// Offered and being applied.
    Applying,
    /// In effect on the agent.
    Applied,
    /// The agent rejected them.
    Failed,
}

impl LedgerStatus for SettingsStatus {
    const IDLE: Self = Self::Unset;
    const IN_FLIGHT: Self = Self::Applying;
    const DONE: Self = Self::Applied;
    const FAILED: Self = Self::Failed;
}

impl SettingsStatus {
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

impl fmt::Display for SettingsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SettingsStatus {
    type Error = ParseDistributionValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unset" => Ok(Self::Unset),
            "applying" => Ok(Self::Applying),
            "applied" => Ok(Self::Applied),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseDistributionValueError::new("settings status", value)),
        }
    }
}

/// Connection settings published to an organisation's agents.
///
/// The hash is derived from the settings themselves, so republishing
/// identical settings is not a new offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSettingsOffer {
    org_id: OrgId,
    endpoint: Option<String>,
    heartbeat_interval_secs: u64,
    headers: BTreeMap<String, String>,
    hash: ConfigHash,
}

impl ConnectionSettingsOffer {
    /// Creates an offer.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionDomainError::InvalidHeartbeatInterval`] for a
    /// zero interval.
    pub fn new(
        org_id: OrgId,
        endpoint: Option<String>,
        heartbeat_interval_secs: u64,
        headers: BTreeMap<String, String>,
    ) -> Result<Self, DistributionDomainError> {
        if heartbeat_interval_secs == 0 {
            return Err(DistributionDomainError::InvalidHeartbeatInterval);
        }
        let target = endpoint.filter(|url| !url.trim().is_empty());
        let mut canonical = format!(
            "endpoint={}\nheartbeat={heartbeat_interval_secs}\n",
            target.as_deref().unwrap_or_default()
        );
        canonical.extend(
            headers
                .iter()
                .map(|(name, value)| format!("header:{name}={value}\n")),
        );
        Ok(Self {
            org_id,
            endpoint: target,
            heartbeat_interval_secs,
            headers,
            hash: ConfigHash::of(canonical.as_bytes()),
        })
    }

    /// Owning organisation.
    #[must_use]
    pub const fn org_id(&self) -> OrgId {
        self.org_id
    }

    /// Replacement server endpoint, if the agent should move.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Heartbeat interval the agent should use.
    #[must_use]
    pub const fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval_secs
    }

    /// Extra request headers.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Digest identifying these settings.
    #[must_use]
    pub const fn hash(&self) -> ConfigHash {
        self.hash
    }
}

/// Connection-settings status as reported by an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedSettings {
    /// Mapped apply state.
    pub status: SettingsStatus,
    /// Hash of the settings the report refers to.
    pub hash: Option<ConfigHash>,
    /// Agent-supplied failure detail.
    pub error_message: Option<String>,
}

/// Apply record for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsRecord {
    agent_id: AgentId,
    delivery: Delivery<SettingsStatus>,
}

impl SettingsRecord {
    /// Creates an unset record.
    #[must_use]
    pub fn new(agent_id: AgentId, clock: &impl mockable::Clock) -> Self {
        Self {
            agent_id,
            delivery: Delivery::idle(clock),
        }
    }

    /// Reconstructs a record from storage.
    #[must_use]
    pub const fn from_parts(agent_id: AgentId, delivery: Delivery<SettingsStatus>) -> Self {
        Self { agent_id, delivery }
    }

    /// Agent the record belongs to.
    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Apply state.
    #[must_use]
    pub const fn status(&self) -> SettingsStatus {
        self.delivery.status()
    }

    /// Delivery details.
    #[must_use]
    pub const fn delivery(&self) -> &Delivery<SettingsStatus> {
        &self.delivery
    }

    /// Mutable delivery details.
    pub const fn delivery_mut(&mut self) -> &mut Delivery<SettingsStatus> {
        &mut self.delivery
    }
}
