//! Domain model for configuration deployments and their audit ledger.

mod audit;
mod deployment;
mod error;
mod ids;
mod name;
mod progress;
mod status;
mod strategy;

pub use audit::{AuditReportOutcome, ConfigAudit, PersistedAuditData, ROLLED_BACK_MESSAGE};
pub use deployment::{ConfigDeployment, NewDeployment, PersistedDeploymentData};
pub use error::{ParseRolloutValueError, RolloutDomainError};
pub use ids::{AuditId, ConfigVersion, DeploymentId};
pub use name::DeploymentName;
pub use progress::DeploymentProgress;
pub use status::{AuditStatus, DeploymentStatus};
pub use strategy::RolloutStrategy;
