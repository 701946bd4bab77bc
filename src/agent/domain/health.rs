//! Liveness projection derived from heartbeat staleness.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::fmt;

/// Contact within this window counts as healthy.
pub const HEALTHY_WITHIN: TimeDelta = TimeDelta::seconds(60);
/// Contact within this window counts as degraded.
pub const DEGRADED_WITHIN: TimeDelta = TimeDelta::seconds(300);

/// Derived liveness of an agent. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentHealth {
    /// Seen within the last minute.
    Healthy,
    /// Seen within the last five minutes.
    Degraded,
    /// Not seen recently, or never.
    Unhealthy,
}

impl AgentHealth {
    /// Classifies an agent by the time since its last contact.
    #[must_use]
    pub fn from_last_seen(last_seen_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(seen) = last_seen_at else {
            return Self::Unhealthy;
        };
        let elapsed = now.signed_duration_since(seen);
        if elapsed <= HEALTHY_WITHIN {
            Self::Healthy
        } else if elapsed <= DEGRADED_WITHIN {
            Self::Degraded
        } else {
            Self::Unhealthy
        }
    }

    /// Returns the canonical display representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for AgentHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-organisation liveness counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HealthSummary {
    /// Agents classified healthy.
    pub healthy: usize,
    /// Agents classified degraded.
    pub degraded: usize,
    /// Agents classified unhealthy.
    pub unhealthy: usize,
}

impl HealthSummary {
    /// Adds one agent to the matching bucket.
    pub const fn record(&mut self, health: AgentHealth) {
        match health {
            AgentHealth::Healthy => self.healthy += 1,
            AgentHealth::Degraded => self.degraded += 1,
            AgentHealth::Unhealthy => self.unhealthy += 1,
        }
    }

    /// Returns the number of agents counted.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.healthy + self.degraded + self.unhealthy
    }
}
