//! Configuration deployment aggregate root.

use super::{
    ConfigVersion, DeploymentId, DeploymentName, DeploymentStatus, RolloutDomainError,
    RolloutStrategy,
};
use crate::agent::domain::{AgentTag, OrgId, TagMatch};
use crate::pipeline::domain::ConfigHash;
use chrono::{DateTime, Utc};
use mockable::Clock;

/// Parameters for a new deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeployment {
    /// Owning organisation.
    pub org_id: OrgId,
    /// Operator-facing name.
    pub name: DeploymentName,
    /// Version issued by the version sequence.
    pub version: ConfigVersion,
    /// Exact configuration text.
    pub content: String,
    /// How targets are reached.
    pub strategy: RolloutStrategy,
    /// Targeting tags; empty targets every agent of the organisation.
    pub target_tags: Vec<AgentTag>,
    /// How `target_tags` is matched.
    pub tag_match: TagMatch,
    /// Whether failed validation was overridden.
    pub validation_overridden: bool,
}

/// Configuration deployment aggregate root.
///
/// Content, hash, version, and targeting never change after creation; only
/// status, stage, and timestamps do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDeployment {
    id: DeploymentId,
    org_id: OrgId,
    name: DeploymentName,
    version: ConfigVersion,
    content: String,
    hash: ConfigHash,
    strategy: RolloutStrategy,
    target_tags: Vec<AgentTag>,
    tag_match: TagMatch,
    current_stage: usize,
    status: DeploymentStatus,
    validation_overridden: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedDeploymentData {
    /// Persisted identifier.
    pub id: DeploymentId,
    /// Owning organisation.
    pub org_id: OrgId,
    /// Operator-facing name.
    pub name: DeploymentName,
    /// Global version.
    pub version: ConfigVersion,
    /// Exact configuration text.
    pub content: String,
    /// Hash of `content`.
    pub hash: ConfigHash,
    /// Rollout strategy.
    pub strategy: RolloutStrategy,
    /// Targeting tags.
    pub target_tags: Vec<AgentTag>,
    /// Tag match mode.
    pub tag_match: TagMatch,
    /// Index of the current stage.
    pub current_stage: usize,
    /// Lifecycle status.
    pub status: DeploymentStatus,
    /// Whether failed validation was overridden.
    pub validation_overridden: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// When targets were first stamped.
    pub started_at: Option<DateTime<Utc>>,
    /// When the deployment reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ConfigDeployment {
    /// Creates a pending deployment, hashing the exact content bytes.
    #[must_use]
    pub fn new(params: NewDeployment, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        let hash = ConfigHash::of(params.content.as_bytes());
        Self {
            id: DeploymentId::new(),
            org_id: params.org_id,
            name: params.name,
            version: params.version,
            content: params.content,
            hash,
            strategy: params.strategy,
            target_tags: params.target_tags,
            tag_match: params.tag_match,
            current_stage: 0,
            status: DeploymentStatus::Pending,
            validation_overridden: params.validation_overridden,
            created_at: timestamp,
            updated_at: timestamp,
            started_at: None,
            finished_at: None,
        }
    }

    /// Reconstructs a deployment from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedDeploymentData) -> Self {
        Self {
            id: data.id,
            org_id: data.org_id,
            name: data.name,
            version: data.version,
            content: data.content,
            hash: data.hash,
            strategy: data.strategy,
            target_tags: data.target_tags,
            tag_match: data.tag_match,
            current_stage: data.current_stage,
            status: data.status,
            validation_overridden: data.validation_overridden,
            created_at: data.created_at,
            updated_at: data.updated_at,
            started_at: data.started_at,
            finished_at: data.finished_at,
        }
    }

    /// Returns the deployment identifier.
    #[must_use]
    pub const fn id(&self) -> DeploymentId {
        self.id
    }

    /// Returns the owning organisation.
    #[must_use]
    pub const fn org_id(&self) -> OrgId {
        self.org_id
    }

    /// Returns the deployment name.
    #[must_use]
    pub const fn name(&self) -> &DeploymentName {
        &self.name
    }

    /// Returns the global version.
    #[must_use]
    pub const fn version(&self) -> ConfigVersion {
        self.version
    }

    /// Returns the exact configuration text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the content hash.
    #[must_use]
    pub const fn hash(&self) -> ConfigHash {
        self.hash
    }

    /// Returns the rollout strategy.
    #[must_use]
    pub const fn strategy(&self) -> &RolloutStrategy {
        &self.strategy
    }

    /// Returns the targeting tags.
    #[must_use]
    pub fn target_tags(&self) -> &[AgentTag] {
        &self.target_tags
    }

    /// Returns the tag match mode.
    #[must_use]
    pub const fn tag_match(&self) -> TagMatch {
        self.tag_match
    }

    /// Returns the index of the current stage.
    #[must_use]
    pub const fn current_stage(&self) -> usize {
        self.current_stage
    }

    /// Returns the cumulative percentage of the current stage.
    #[must_use]
    pub fn current_percentage(&self) -> u8 {
        self.strategy
            .stage_percentage(self.current_stage)
            .unwrap_or(100)
    }

    /// Returns `true` once the final stage has been reached.
    #[must_use]
    pub fn at_final_stage(&self) -> bool {
        self.current_stage >= self.strategy.final_stage()
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> DeploymentStatus {
        self.status
    }

    /// Returns `true` when failed validation was overridden.
    #[must_use]
    pub const fn validation_overridden(&self) -> bool {
        self.validation_overridden
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns when targets were first stamped.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns when the deployment reached a terminal status.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Moves to `next`, enforcing the lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutDomainError::InvalidDeploymentTransition`] when the
    /// lifecycle does not permit the move.
    pub fn transition_to(
        &mut self,
        next: DeploymentStatus,
        clock: &impl Clock,
    ) -> Result<(), RolloutDomainError> {
        if !self.status.can_transition_to(next) {
            return Err(RolloutDomainError::InvalidDeploymentTransition {
                from: self.status,
                to: next,
            });
        }
        let now = clock.utc();
        if next == DeploymentStatus::InProgress {
            self.started_at = Some(now);
        } else if next != DeploymentStatus::Pending {
            self.started_at.get_or_insert(now);
            self.finished_at = Some(now);
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Moves to the next stage, returning its cumulative percentage.
    ///
    /// Returns `None` when already at the final stage.
    pub fn advance_stage(&mut self, clock: &impl Clock) -> Option<u8> {
        let next = self.current_stage.saturating_add(1);
        let percentage = self.strategy.stage_percentage(next)?;
        self.current_stage = next;
        self.updated_at = clock.utc();
        Some(percentage)
    }
}
