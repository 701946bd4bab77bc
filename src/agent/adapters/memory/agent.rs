//! Thread-safe in-memory agent repository for tests and single-node runs.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::agent::{
    domain::{Agent, AgentId, AgentTag, InstanceUid, OrgId, TagMatch},
    ports::{AgentRepository, AgentRepositoryError, AgentRepositoryResult},
};

/// In-memory agent repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentRepository {
    state: Arc<RwLock<InMemoryAgentState>>,
}

#[derive(Debug, Default)]
struct InMemoryAgentState {
    agents: BTreeMap<AgentId, Agent>,
    instance_index: HashMap<(OrgId, InstanceUid), AgentId>,
}

impl InMemoryAgentRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_filtered(
        &self,
        keep: impl Fn(&Agent) -> bool,
    ) -> AgentRepositoryResult<Vec<Agent>> {
        let state = self.state.read().map_err(|err| {
            AgentRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state.agents.values().filter(|agent| keep(agent)).cloned().collect())
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn insert(&self, agent: &Agent) -> AgentRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| {
            AgentRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;

        let key = (agent.org_id(), agent.instance_uid().clone());
        if state.instance_index.contains_key(&key) {
            return Err(AgentRepositoryError::DuplicateInstance {
                org_id: agent.org_id(),
                instance_uid: agent.instance_uid().clone(),
            });
        }

        state.instance_index.insert(key, agent.id());
        state.agents.insert(agent.id(), agent.clone());
        Ok(())
    }

    async fn update(&self, agent: &mut Agent) -> AgentRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| {
            AgentRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;

        let stored = state
            .agents
            .get(&agent.id())
            .ok_or(AgentRepositoryError::NotFound(agent.id()))?;
        if stored.revision() != agent.revision() {
            return Err(AgentRepositoryError::ConcurrentModification {
                id: agent.id(),
                expected: agent.revision(),
            });
        }

        agent.advance_revision();
        state.agents.insert(agent.id(), agent.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> AgentRepositoryResult<Option<Agent>> {
        let state = self.state.read().map_err(|err| {
            AgentRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state.agents.get(&id).cloned())
    }

    async fn find_by_instance_uid(
        &self,
        org_id: OrgId,
        instance_uid: &InstanceUid,
    ) -> AgentRepositoryResult<Option<Agent>> {
        let state = self.state.read().map_err(|err| {
            AgentRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let agent = state
            .instance_index
            .get(&(org_id, instance_uid.clone()))
            .and_then(|id| state.agents.get(id))
            .cloned();
        Ok(agent)
    }

    async fn list_by_org(&self, org_id: OrgId) -> AgentRepositoryResult<Vec<Agent>> {
        self.read_filtered(|agent| agent.org_id() == org_id)
    }

    async fn list_by_tags(
        &self,
        org_id: OrgId,
        tags: &[AgentTag],
        mode: TagMatch,
    ) -> AgentRepositoryResult<Vec<Agent>> {
        self.read_filtered(|agent| agent.org_id() == org_id && mode.matches(tags, agent.tags()))
    }
}
