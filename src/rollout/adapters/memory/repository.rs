//! Thread-safe in-memory deployment repository.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::agent::domain::{AgentId, OrgId};
use crate::pipeline::domain::ConfigHash;
use crate::rollout::{
    domain::{AuditStatus, ConfigAudit, ConfigDeployment, ConfigVersion, DeploymentId},
    ports::{DeploymentRepository, DeploymentRepositoryError, DeploymentRepositoryResult},
};

/// In-memory deployment and audit repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeploymentRepository {
    state: Arc<RwLock<InMemoryDeploymentState>>,
}

#[derive(Debug, Default)]
struct InMemoryDeploymentState {
    deployments: HashMap<DeploymentId, ConfigDeployment>,
    versions: HashSet<ConfigVersion>,
    audits: BTreeMap<(DeploymentId, AgentId), ConfigAudit>,
}

impl InMemoryDeploymentState {
    fn check_new_audits(&self, audits: &[ConfigAudit]) -> DeploymentRepositoryResult<()> {
        let mut seen = HashSet::new();
        for audit in audits {
            let key = (audit.deployment_id(), audit.agent_id());
            if self.audits.contains_key(&key) || !seen.insert(key) {
                return Err(DeploymentRepositoryError::DuplicateAudit {
                    deployment_id: audit.deployment_id(),
                    agent_id: audit.agent_id(),
                });
            }
        }
        Ok(())
    }

    fn store_audits(&mut self, audits: &[ConfigAudit]) {
        for audit in audits {
            self.audits
                .insert((audit.deployment_id(), audit.agent_id()), audit.clone());
        }
    }

    fn agent_history(&self, agent_id: AgentId) -> Vec<ConfigAudit> {
        let mut history: Vec<ConfigAudit> = self
            .audits
            .values()
            .filter(|audit| audit.agent_id() == agent_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.version().cmp(&a.version()));
        history
    }
}

impl InMemoryDeploymentRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(err: &impl std::fmt::Display) -> DeploymentRepositoryError {
    DeploymentRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl DeploymentRepository for InMemoryDeploymentRepository {
    async fn insert(
        &self,
        deployment: &ConfigDeployment,
        audits: &[ConfigAudit],
    ) -> DeploymentRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| poisoned(&err))?;
        if state.deployments.contains_key(&deployment.id())
            || state.versions.contains(&deployment.version())
        {
            return Err(DeploymentRepositoryError::DuplicateDeployment(
                deployment.id(),
            ));
        }
        state.check_new_audits(audits)?;

        state.versions.insert(deployment.version());
        state
            .deployments
            .insert(deployment.id(), deployment.clone());
        state.store_audits(audits);
        Ok(())
    }

    async fn update(&self, deployment: &ConfigDeployment) -> DeploymentRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| poisoned(&err))?;
        let stored = state
            .deployments
            .get_mut(&deployment.id())
            .ok_or(DeploymentRepositoryError::NotFound(deployment.id()))?;
        *stored = deployment.clone();
        Ok(())
    }

    async fn find(
        &self,
        id: DeploymentId,
    ) -> DeploymentRepositoryResult<Option<ConfigDeployment>> {
        let state = self.state.read().map_err(|err| poisoned(&err))?;
        Ok(state.deployments.get(&id).cloned())
    }

    async fn list_by_org(
        &self,
        org_id: OrgId,
    ) -> DeploymentRepositoryResult<Vec<ConfigDeployment>> {
        let state = self.state.read().map_err(|err| poisoned(&err))?;
        let mut deployments: Vec<ConfigDeployment> = state
            .deployments
            .values()
            .filter(|deployment| deployment.org_id() == org_id)
            .cloned()
            .collect();
        deployments.sort_by(|a, b| b.version().cmp(&a.version()));
        Ok(deployments)
    }

    async fn insert_audits(&self, audits: &[ConfigAudit]) -> DeploymentRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| poisoned(&err))?;
        for audit in audits {
            if !state.deployments.contains_key(&audit.deployment_id()) {
                return Err(DeploymentRepositoryError::NotFound(audit.deployment_id()));
            }
        }
        state.check_new_audits(audits)?;
        state.store_audits(audits);
        Ok(())
    }

    async fn update_audit(
        &self,
        audit: &ConfigAudit,
        expected: AuditStatus,
    ) -> DeploymentRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| poisoned(&err))?;
        let stored = state
            .audits
            .get_mut(&(audit.deployment_id(), audit.agent_id()))
            .ok_or(DeploymentRepositoryError::AuditNotFound {
                deployment_id: audit.deployment_id(),
                agent_id: audit.agent_id(),
            })?;
        if stored.status() != expected {
            return Err(DeploymentRepositoryError::StaleAudit {
                agent_id: audit.agent_id(),
                expected,
            });
        }
        *stored = audit.clone();
        Ok(())
    }

    async fn list_audits(
        &self,
        deployment_id: DeploymentId,
    ) -> DeploymentRepositoryResult<Vec<ConfigAudit>> {
        let state = self.state.read().map_err(|err| poisoned(&err))?;
        Ok(state
            .audits
            .range((deployment_id, AgentId::from_uuid(uuid::Uuid::nil()))..)
            .take_while(|((id, _), _)| *id == deployment_id)
            .map(|(_, audit)| audit.clone())
            .collect())
    }

    async fn list_audits_for_agent(
        &self,
        agent_id: AgentId,
    ) -> DeploymentRepositoryResult<Vec<ConfigAudit>> {
        let state = self.state.read().map_err(|err| poisoned(&err))?;
        Ok(state.agent_history(agent_id))
    }

    async fn find_audit_by_hash(
        &self,
        agent_id: AgentId,
        hash: ConfigHash,
    ) -> DeploymentRepositoryResult<Option<ConfigAudit>> {
        let state = self.state.read().map_err(|err| poisoned(&err))?;
        Ok(state
            .agent_history(agent_id)
            .into_iter()
            .find(|audit| audit.config_hash() == hash))
    }

    async fn next_pending_audit(
        &self,
        agent_id: AgentId,
    ) -> DeploymentRepositoryResult<Option<ConfigAudit>> {
        let state = self.state.read().map_err(|err| poisoned(&err))?;
        Ok(state
            .agent_history(agent_id)
            .into_iter()
            .find(|audit| audit.status() == AuditStatus::Pending))
    }
}
