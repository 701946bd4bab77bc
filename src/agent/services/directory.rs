//! Agent registration, tagging, and read-modify-write orchestration.

use crate::agent::{
    domain::{
        Agent, AgentDomainError, AgentId, AgentTag, DeploymentMode, HealthSummary, InstanceUid,
        OrgId, TagMatch,
    },
    ports::{AgentRepository, AgentRepositoryError},
};
use mockable::Clock;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Attempts made by [`AgentDirectoryService::modify`] before a revision
/// conflict is surfaced to the caller.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// Request payload for registering an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterAgentRequest {
    org_id: OrgId,
    instance_uid: String,
    name: Option<String>,
    tags: Option<Vec<String>>,
    deployment_mode: Option<DeploymentMode>,
}

impl RegisterAgentRequest {
    /// Creates a request identifying the agent.
    #[must_use]
    pub fn new(org_id: OrgId, instance_uid: impl Into<String>) -> Self {
        Self {
            org_id,
            instance_uid: instance_uid.into(),
            name: None,
            tags: None,
            deployment_mode: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replaces the agent's tags on registration.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Declares the deployment mode.
    #[must_use]
    pub const fn with_deployment_mode(mut self, mode: DeploymentMode) -> Self {
        self.deployment_mode = Some(mode);
        self
    }
}

/// Service-level errors for agent directory operations.
#[derive(Debug, Error)]
pub enum AgentDirectoryError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] AgentDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] AgentRepositoryError),
}

impl AgentDirectoryError {
    /// Returns `true` when the backing store itself failed.
    #[must_use]
    pub const fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::Repository(AgentRepositoryError::Persistence(_))
        )
    }
}

/// Result type for agent directory service operations.
pub type AgentDirectoryResult<T> = Result<T, AgentDirectoryError>;

/// Agent directory orchestration service.
pub struct AgentDirectoryService<R, C>
where
    R: AgentRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
}

impl<R, C> Clone for AgentDirectoryService<R, C>
where
    R: AgentRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R, C> AgentDirectoryService<R, C>
where
    R: AgentRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new directory service.
    #[must_use]
    pub const fn new(repository: Arc<R>, clock: Arc<C>) -> Self {
        Self { repository, clock }
    }

    /// Returns the service clock.
    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Registers an agent, or refreshes the mutable fields of an existing
    /// registration with the same instance identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDirectoryError::Domain`] for an invalid identifier or
    /// tag, or [`AgentDirectoryError::Repository`] when persistence fails.
    pub async fn register(&self, request: RegisterAgentRequest) -> AgentDirectoryResult<Agent> {
        let RegisterAgentRequest {
            org_id,
            instance_uid,
            name,
            tags,
            deployment_mode,
        } = request;
        let uid = InstanceUid::new(instance_uid)?;
        let parsed_tags = tags
            .map(|raw| {
                raw.iter()
                    .map(AgentTag::new)
                    .collect::<Result<BTreeSet<_>, _>>()
            })
            .transpose()?;

        let refresh = |agent: &mut Agent, clock: &C| {
            if name.is_some() {
                agent.rename(name.clone(), clock);
            }
            if let Some(replacement) = &parsed_tags {
                agent.replace_tags(replacement.clone(), clock);
            }
            if let Some(mode) = deployment_mode {
                agent.set_deployment_mode(mode, clock);
            }
        };

        if let Some(existing) = self.repository.find_by_instance_uid(org_id, &uid).await? {
            let (agent, ()) = self.modify(existing.id(), refresh).await?;
            debug!(agent_id = %agent.id(), instance_uid = %uid, "agent re-registered");
            return Ok(agent);
        }

        let mut agent = Agent::new(org_id, uid.clone(), &*self.clock);
        refresh(&mut agent, &*self.clock);
        match self.repository.insert(&agent).await {
            Ok(()) => {
                info!(agent_id = %agent.id(), %org_id, instance_uid = %uid, "agent registered");
                Ok(agent)
            }
            Err(AgentRepositoryError::DuplicateInstance { .. }) => {
                // Lost a registration race; fold into the winner's row.
                let winner = self
                    .repository
                    .find_by_instance_uid(org_id, &uid)
                    .await?
                    .ok_or_else(|| AgentRepositoryError::NotFound(agent.id()))?;
                let (refreshed, ()) = self.modify(winner.id(), refresh).await?;
                Ok(refreshed)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Finds an agent by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDirectoryError::Repository`] when lookup fails.
    pub async fn find(&self, id: AgentId) -> AgentDirectoryResult<Option<Agent>> {
        Ok(self.repository.find_by_id(id).await?)
    }

    /// Resolves an agent from its organisation-scoped instance identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDirectoryError::Repository`] when lookup fails.
    pub async fn resolve(
        &self,
        org_id: OrgId,
        instance_uid: &InstanceUid,
    ) -> AgentDirectoryResult<Option<Agent>> {
        Ok(self
            .repository
            .find_by_instance_uid(org_id, instance_uid)
            .await?)
    }

    /// Applies a synchronous mutation as one conditional write.
    ///
    /// The agent is re-read and the mutation re-run when another writer
    /// won the race, up to [`MAX_WRITE_ATTEMPTS`] times. Store failures are
    /// returned immediately.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRepositoryError::NotFound`] for an unknown agent,
    /// [`AgentRepositoryError::ConcurrentModification`] when every attempt
    /// lost a race, or the underlying persistence failure.
    pub async fn modify<T, F>(
        &self,
        id: AgentId,
        mut mutate: F,
    ) -> AgentDirectoryResult<(Agent, T)>
    where
        F: FnMut(&mut Agent, &C) -> T + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            let mut agent = self
                .repository
                .find_by_id(id)
                .await?
                .ok_or(AgentRepositoryError::NotFound(id))?;
            let outcome = mutate(&mut agent, &*self.clock);
            match self.repository.update(&mut agent).await {
                Ok(()) => return Ok((agent, outcome)),
                Err(AgentRepositoryError::ConcurrentModification { .. })
                    if attempt < MAX_WRITE_ATTEMPTS =>
                {
                    debug!(agent_id = %id, attempt, "agent write conflicted; retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Records contact from an agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDirectoryError::Repository`] when the agent is unknown
    /// or persistence fails.
    pub async fn record_heartbeat(&self, id: AgentId) -> AgentDirectoryResult<Agent> {
        let (agent, ()) = self
            .modify(id, |agent, clock| agent.record_heartbeat(clock))
            .await?;
        Ok(agent)
    }

    /// Marks an agent's channel closed.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDirectoryError::Repository`] when the agent is unknown
    /// or persistence fails.
    pub async fn mark_disconnected(&self, id: AgentId) -> AgentDirectoryResult<Agent> {
        let (agent, ()) = self
            .modify(id, |agent, clock| agent.mark_disconnected(clock))
            .await?;
        Ok(agent)
    }

    /// Adds a tag to an agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDirectoryError::Domain`] for an invalid tag, or
    /// [`AgentDirectoryError::Repository`] when persistence fails.
    pub async fn tag(&self, id: AgentId, tag: &str) -> AgentDirectoryResult<Agent> {
        let parsed = AgentTag::new(tag)?;
        let (agent, _) = self
            .modify(id, |agent, clock| agent.add_tag(parsed.clone(), clock))
            .await?;
        Ok(agent)
    }

    /// Removes a tag from an agent. Removing an absent tag is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDirectoryError::Domain`] for an invalid tag, or
    /// [`AgentDirectoryError::Repository`] when persistence fails.
    pub async fn untag(&self, id: AgentId, tag: &str) -> AgentDirectoryResult<Agent> {
        let parsed = AgentTag::new(tag)?;
        let (agent, _) = self
            .modify(id, |agent, clock| agent.remove_tag(&parsed, clock))
            .await?;
        Ok(agent)
    }

    /// Lists an organisation's agents.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDirectoryError::Repository`] when lookup fails.
    pub async fn list(&self, org_id: OrgId) -> AgentDirectoryResult<Vec<Agent>> {
        Ok(self.repository.list_by_org(org_id).await?)
    }

    /// Lists agents carrying any or all of the given tags.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDirectoryError::Domain`] for an invalid tag, or
    /// [`AgentDirectoryError::Repository`] when lookup fails.
    pub async fn list_by_tag(
        &self,
        org_id: OrgId,
        tags: &[&str],
        mode: TagMatch,
    ) -> AgentDirectoryResult<Vec<Agent>> {
        let parsed = tags
            .iter()
            .map(AgentTag::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.repository.list_by_tags(org_id, &parsed, mode).await?)
    }

    /// Counts an organisation's agents by derived liveness.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDirectoryError::Repository`] when lookup fails.
    pub async fn health_summary(&self, org_id: OrgId) -> AgentDirectoryResult<HealthSummary> {
        let now = self.clock.utc();
        let mut summary = HealthSummary::default();
        for agent in self.repository.list_by_org(org_id).await? {
            summary.record(agent.health(now));
        }
        Ok(summary)
    }
}
