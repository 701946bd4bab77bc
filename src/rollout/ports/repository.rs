//! Repository port for deployments and their audit ledger.

use crate::agent::domain::{AgentId, OrgId};
use crate::pipeline::domain::ConfigHash;
use crate::rollout::domain::{AuditStatus, ConfigAudit, ConfigDeployment, DeploymentId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for deployment repository operations.
pub type DeploymentRepositoryResult<T> = Result<T, DeploymentRepositoryError>;

/// Deployment and audit persistence contract.
#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    /// Stores a new deployment together with its initial audit rows, all or
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentRepositoryError::DuplicateDeployment`] for a
    /// reused identifier or version, or
    /// [`DeploymentRepositoryError::DuplicateAudit`] for a repeated
    /// (deployment, agent) pair.
    async fn insert(
        &self,
        deployment: &ConfigDeployment,
        audits: &[ConfigAudit],
    ) -> DeploymentRepositoryResult<()>;

    /// Persists status, stage, and timestamp changes.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentRepositoryError::NotFound`] for an unknown
    /// deployment.
    async fn update(&self, deployment: &ConfigDeployment) -> DeploymentRepositoryResult<()>;

    /// Finds a deployment by identifier.
    async fn find(
        &self,
        id: DeploymentId,
    ) -> DeploymentRepositoryResult<Option<ConfigDeployment>>;

    /// Lists an organisation's deployments, newest version first.
    async fn list_by_org(
        &self,
        org_id: OrgId,
    ) -> DeploymentRepositoryResult<Vec<ConfigDeployment>>;

    /// Adds audit rows to an existing deployment, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentRepositoryError::DuplicateAudit`] when a
    /// (deployment, agent) pair already has a row.
    async fn insert_audits(&self, audits: &[ConfigAudit]) -> DeploymentRepositoryResult<()>;

    /// Persists an audit row if its stored status is still `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentRepositoryError::StaleAudit`] when the row moved
    /// since it was read, or [`DeploymentRepositoryError::AuditNotFound`].
    async fn update_audit(
        &self,
        audit: &ConfigAudit,
        expected: AuditStatus,
    ) -> DeploymentRepositoryResult<()>;

    /// Returns a deployment's audit rows ordered by agent identifier.
    async fn list_audits(
        &self,
        deployment_id: DeploymentId,
    ) -> DeploymentRepositoryResult<Vec<ConfigAudit>>;

    /// Returns an agent's audit history, newest version first.
    async fn list_audits_for_agent(
        &self,
        agent_id: AgentId,
    ) -> DeploymentRepositoryResult<Vec<ConfigAudit>>;

    /// Returns the agent's newest audit row for the given content hash.
    async fn find_audit_by_hash(
        &self,
        agent_id: AgentId,
        hash: ConfigHash,
    ) -> DeploymentRepositoryResult<Option<ConfigAudit>>;

    /// Returns the agent's newest pending audit row.
    async fn next_pending_audit(
        &self,
        agent_id: AgentId,
    ) -> DeploymentRepositoryResult<Option<ConfigAudit>>;
}

/// Errors returned by deployment repository implementations.
#[derive(Debug, Clone, Error)]
pub enum DeploymentRepositoryError {
    /// A deployment with the same identifier or version already exists.
    #[error("duplicate deployment: {0}")]
    DuplicateDeployment(DeploymentId),

    /// The (deployment, agent) pair already has an audit row.
    #[error("deployment {deployment_id} already has an audit row for agent {agent_id}")]
    DuplicateAudit {
        /// Deployment of the clashing row.
        deployment_id: DeploymentId,
        /// Agent of the clashing row.
        agent_id: AgentId,
    },

    /// The deployment was not found.
    #[error("deployment not found: {0}")]
    NotFound(DeploymentId),

    /// The audit row was not found.
    #[error("audit row not found for deployment {deployment_id} and agent {agent_id}")]
    AuditNotFound {
        /// Deployment of the missing row.
        deployment_id: DeploymentId,
        /// Agent of the missing row.
        agent_id: AgentId,
    },

    /// The audit row changed status since it was read.
    #[error("audit row for agent {agent_id} is no longer {expected}")]
    StaleAudit {
        /// Agent of the contended row.
        agent_id: AgentId,
        /// Status the caller read.
        expected: AuditStatus,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl DeploymentRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
