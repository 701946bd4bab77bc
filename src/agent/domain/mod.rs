//! Domain model for registered agents.
//!
//! Wire concerns stay in the protocol layer; the types here describe what
//! the control plane knows about each agent and how that knowledge may
//! change.

mod agent;
mod error;
mod health;
mod ids;
mod reports;
mod status;
mod tag;

pub use agent::{Agent, CapabilityUpdate, ConfigTarget, PersistedAgentData, SequenceObservation};
pub use error::{AgentDomainError, ParseAgentValueError};
pub use health::{AgentHealth, DEGRADED_WITHIN, HEALTHY_WITHIN, HealthSummary};
pub use ids::{AgentId, InstanceUid, OrgId};
pub use reports::{
    AgentDescription, DEPLOYMENT_MODE_ATTRIBUTE, EffectiveConfig, RemoteConfigState,
    RemoteConfigStatus, ReportedHealth, SERVICE_NAME_ATTRIBUTE,
};
pub use status::{ConnectionStatus, DeploymentMode, TransportType};
pub use tag::{AgentTag, TagMatch};
