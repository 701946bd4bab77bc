//! Repository port for agent directory persistence.

use crate::agent::domain::{Agent, AgentId, AgentTag, InstanceUid, OrgId, TagMatch};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for agent repository operations.
pub type AgentRepositoryResult<T> = Result<T, AgentRepositoryError>;

/// Agent persistence contract.
///
/// Writes are row-scoped: [`AgentRepository::update`] succeeds only when the
/// stored revision still equals the revision the caller read.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Stores a newly registered agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRepositoryError::DuplicateInstance`] when the
    /// organisation already has an agent with the same instance identifier.
    async fn insert(&self, agent: &Agent) -> AgentRepositoryResult<()>;

    /// Persists changes to an existing agent and advances its revision.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRepositoryError::NotFound`] when the agent does not
    /// exist, or [`AgentRepositoryError::ConcurrentModification`] when it was
    /// written since `agent` was read.
    async fn update(&self, agent: &mut Agent) -> AgentRepositoryResult<()>;

    /// Finds an agent by surrogate identifier.
    async fn find_by_id(&self, id: AgentId) -> AgentRepositoryResult<Option<Agent>>;

    /// Finds an agent by its organisation-scoped instance identifier.
    async fn find_by_instance_uid(
        &self,
        org_id: OrgId,
        instance_uid: &InstanceUid,
    ) -> AgentRepositoryResult<Option<Agent>>;

    /// Returns every agent of an organisation ordered by identifier.
    async fn list_by_org(&self, org_id: OrgId) -> AgentRepositoryResult<Vec<Agent>>;

    /// Returns the agents of an organisation whose tags satisfy `tags` under
    /// `mode`, ordered by identifier. An empty `tags` slice selects all.
    async fn list_by_tags(
        &self,
        org_id: OrgId,
        tags: &[AgentTag],
        mode: TagMatch,
    ) -> AgentRepositoryResult<Vec<Agent>>;
}

/// Errors returned by agent repository implementations.
#[derive(Debug, Clone, Error)]
pub enum AgentRepositoryError {
    /// An agent with the same instance identifier exists in the organisation.
    #[error("duplicate agent instance {instance_uid} in organisation {org_id}")]
    DuplicateInstance {
        /// Owning organisation.
        org_id: OrgId,
        /// The clashing instance identifier.
        instance_uid: InstanceUid,
    },

    /// The agent was not found.
    #[error("agent not found: {0}")]
    NotFound(AgentId),

    /// The stored revision no longer matches the one read.
    #[error("agent {id} was modified concurrently (expected revision {expected})")]
    ConcurrentModification {
        /// The contended agent.
        id: AgentId,
        /// Revision the caller read.
        expected: u64,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl AgentRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
