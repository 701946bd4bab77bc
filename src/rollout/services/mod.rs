//! Service layer for configuration rollout.

mod deployment;
mod health_monitor;
mod selector;

pub use deployment::{
    CreateDeploymentRequest, DeploymentService, DeploymentServiceError, DeploymentServiceResult,
    DeploymentStatusReport, PendingDelivery, RearmedTarget, RollbackSummary, StageAdvance,
};
pub use health_monitor::{CanaryHealthMonitor, CanaryHealthReport, HealthGate};
pub use selector::{TargetSelector, cohort, cohort_size, rollout_order};
