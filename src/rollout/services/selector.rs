//! Target resolution and deterministic cohort sampling.

use crate::agent::{
    domain::{Agent, AgentTag, OrgId, TagMatch},
    ports::{AgentRepository, AgentRepositoryResult},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Resolves a deployment's targeting to concrete agents.
///
/// Every strategy draws its cohorts from one order per organisation: the
/// eligible agents sorted by identifier and shuffled with a seed derived
/// from the organisation alone. Successive stages are therefore nested
/// prefixes, and repeating a selection over the same eligible set yields
/// the same cohort.
pub struct TargetSelector<A>
where
    A: AgentRepository,
{
    agents: Arc<A>,
}

impl<A> Clone for TargetSelector<A>
where
    A: AgentRepository,
{
    fn clone(&self) -> Self {
        Self {
            agents: Arc::clone(&self.agents),
        }
    }
}

impl<A> TargetSelector<A>
where
    A: AgentRepository,
{
    /// Creates a selector over the agent store.
    #[must_use]
    pub const fn new(agents: Arc<A>) -> Self {
        Self { agents }
    }

    /// Returns the organisation's agents matching `tags` under `mode`.
    ///
    /// An empty tag list selects every agent of the organisation.
    ///
    /// # Errors
    ///
    /// Returns the store error when the lookup fails.
    pub async fn resolve_targets(
        &self,
        org_id: OrgId,
        tags: &[AgentTag],
        mode: TagMatch,
    ) -> AgentRepositoryResult<Vec<Agent>> {
        if tags.is_empty() {
            return self.agents.list_by_org(org_id).await;
        }
        self.agents.list_by_tags(org_id, tags, mode).await
    }

    /// Resolves targets and returns the cohort covering `percentage` of
    /// them, in rollout order.
    ///
    /// # Errors
    ///
    /// Returns the store error when the lookup fails.
    pub async fn select_cohort(
        &self,
        org_id: OrgId,
        tags: &[AgentTag],
        mode: TagMatch,
        percentage: u8,
    ) -> AgentRepositoryResult<Vec<Agent>> {
        let eligible = self.resolve_targets(org_id, tags, mode).await?;
        Ok(cohort(org_id, eligible, percentage))
    }
}

/// Orders agents for rollout: sorted by identifier, then shuffled with the
/// organisation's seed.
#[must_use]
pub fn rollout_order(org_id: OrgId, mut agents: Vec<Agent>) -> Vec<Agent> {
    agents.sort_by_key(Agent::id);
    let mut rng = fastrand::Rng::with_seed(org_seed(org_id));
    rng.shuffle(&mut agents);
    agents
}

/// Returns the leading `percentage` share of the rollout order.
#[must_use]
pub fn cohort(org_id: OrgId, eligible: Vec<Agent>, percentage: u8) -> Vec<Agent> {
    let size = cohort_size(eligible.len(), percentage);
    let mut ordered = rollout_order(org_id, eligible);
    ordered.truncate(size);
    ordered
}

/// Number of agents a stage at `percentage` covers out of `eligible`.
///
/// At least one agent is chosen whenever any is eligible.
#[must_use]
pub fn cohort_size(eligible: usize, percentage: u8) -> usize {
    if eligible == 0 {
        return 0;
    }
    eligible
        .saturating_mul(usize::from(percentage))
        .div_euclid(100)
        .clamp(1, eligible)
}

fn org_seed(org_id: OrgId) -> u64 {
    Sha256::digest(org_id.into_inner().as_bytes())
        .iter()
        .take(8)
        .fold(0, |seed, byte| (seed << 8) | u64::from(*byte))
}
