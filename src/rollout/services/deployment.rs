//! Deployment creation, staged expansion, delivery bookkeeping, and
//! rollback.

use super::{
    health_monitor::{CanaryHealthMonitor, CanaryHealthReport, HealthGate},
    selector::TargetSelector,
};
use crate::agent::{
    domain::{Agent, AgentDomainError, AgentId, AgentTag, ConfigTarget, OrgId, TagMatch},
    ports::{AgentRepository, AgentRepositoryError},
    services::{AgentDirectoryError, AgentDirectoryService, MAX_WRITE_ATTEMPTS},
};
use crate::pipeline::{
    domain::{ConfigHash, ValidationReport},
    ports::ConfigValidator,
};
use crate::rollout::{
    domain::{
        AuditReportOutcome, AuditStatus, ConfigAudit, ConfigDeployment, ConfigVersion,
        DeploymentId, DeploymentName, DeploymentProgress, DeploymentStatus, NewDeployment,
        RolloutDomainError, RolloutStrategy,
    },
    ports::{DeploymentRepository, DeploymentRepositoryError, VersionSequence},
};
use mockable::Clock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Request payload for creating a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDeploymentRequest {
    org_id: OrgId,
    name: String,
    content: String,
    strategy: RolloutStrategy,
    target_tags: Vec<String>,
    tag_match: TagMatch,
    ignore_validation: bool,
}

impl CreateDeploymentRequest {
    /// Creates an immediate rollout of `content` to every agent of the
    /// organisation.
    #[must_use]
    pub fn new(org_id: OrgId, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            org_id,
            name: name.into(),
            content: content.into(),
            strategy: RolloutStrategy::Immediate,
            target_tags: Vec::new(),
            tag_match: TagMatch::Any,
            ignore_validation: false,
        }
    }

    /// Sets the rollout strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: RolloutStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Restricts targets to agents carrying the given tags.
    #[must_use]
    pub fn with_target_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.target_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets how target tags are matched.
    #[must_use]
    pub const fn with_tag_match(mut self, mode: TagMatch) -> Self {
        self.tag_match = mode;
        self
    }

    /// Deploys even when validation reports errors.
    #[must_use]
    pub const fn ignoring_validation(mut self) -> Self {
        self.ignore_validation = true;
        self
    }
}

/// Deployment together with its aggregate delivery counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStatusReport {
    /// The deployment.
    pub deployment: ConfigDeployment,
    /// Audit row counts.
    pub progress: DeploymentProgress,
}

/// Result of expanding a rollout to its next stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageAdvance {
    /// The deployment after the expansion.
    pub deployment: ConfigDeployment,
    /// Cumulative percentage now targeted.
    pub percentage: u8,
    /// Audit rows created for newly targeted agents.
    pub added: Vec<ConfigAudit>,
    /// Gate evaluation, when a gate was requested.
    pub health: Option<CanaryHealthReport>,
}

/// Previous configuration an agent was pointed back at by a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RearmedTarget {
    /// Agent re-targeted.
    pub agent_id: AgentId,
    /// Deployment re-armed.
    pub deployment_id: DeploymentId,
    /// Version of the re-armed deployment.
    pub version: ConfigVersion,
}

/// Per-agent outcome of a rollback.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RollbackSummary {
    /// Still-open rows withdrawn.
    pub withdrawn: usize,
    /// Agents pointed back at their previous applied configuration.
    pub rearmed: Vec<RearmedTarget>,
    /// Agents with no previous applied configuration; their target is
    /// left unchanged.
    pub untargeted: Vec<AgentId>,
    /// Agents already directed at a different deployment.
    pub superseded: Vec<AgentId>,
}

/// Configuration claimed for delivery on the agent's current exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelivery {
    /// Audit row, now applying.
    pub audit: ConfigAudit,
    /// Deployment carrying the content.
    pub deployment: ConfigDeployment,
}

enum RearmOutcome {
    Rearmed(RearmedTarget),
    Untargeted,
    Superseded,
}

/// Service-level errors for deployment operations.
#[derive(Debug, Error)]
pub enum DeploymentServiceError {
    /// The configuration failed validation and no override was given.
    #[error("configuration rejected: {0}")]
    InvalidConfig(ValidationReport),
    /// Rollout domain validation failed.
    #[error(transparent)]
    Domain(#[from] RolloutDomainError),
    /// Agent domain validation failed.
    #[error(transparent)]
    AgentDomain(#[from] AgentDomainError),
    /// Deployment persistence failed.
    #[error(transparent)]
    Repository(#[from] DeploymentRepositoryError),
    /// Agent persistence failed.
    #[error(transparent)]
    AgentStore(#[from] AgentRepositoryError),
    /// Agent directory operation failed.
    #[error(transparent)]
    Directory(#[from] AgentDirectoryError),
    /// The deployment does not exist.
    #[error("deployment not found: {0}")]
    NotFound(DeploymentId),
    /// The deployment no longer accepts targets.
    #[error("deployment {id} is {status}")]
    DeploymentClosed {
        /// Deployment identifier.
        id: DeploymentId,
        /// Its terminal status.
        status: DeploymentStatus,
    },
    /// The cohort did not meet the health gate.
    #[error("health gate failed: {} of {} applied, {}% required", .0.succeeded, .0.cohort_size, .0.min_success_percent)]
    HealthGateFailed(CanaryHealthReport),
    /// The agent belongs to another organisation.
    #[error("agent {agent_id} does not belong to organisation {org_id}")]
    AgentNotInOrg {
        /// Agent identifier.
        agent_id: AgentId,
        /// Organisation of the deployment.
        org_id: OrgId,
    },
    /// The agent does not exist.
    #[error("agent not found: {0}")]
    UnknownAgent(AgentId),
    /// The rollout already covers every eligible agent.
    #[error("deployment {0} is already at its final stage")]
    NoFurtherStage(DeploymentId),
}

impl DeploymentServiceError {
    /// Returns `true` when a backing store itself failed.
    #[must_use]
    pub const fn is_store_failure(&self) -> bool {
        match self {
            Self::Repository(DeploymentRepositoryError::Persistence(_))
            | Self::AgentStore(AgentRepositoryError::Persistence(_)) => true,
            Self::Directory(err) => err.is_store_failure(),
            _ => false,
        }
    }
}

/// Result type for deployment service operations.
pub type DeploymentServiceResult<T> = Result<T, DeploymentServiceError>;

/// Deployment orchestration service.
pub struct DeploymentService<D, A, S, C>
where
    D: DeploymentRepository,
    A: AgentRepository,
    S: VersionSequence,
    C: Clock + Send + Sync,
{
    deployments: Arc<D>,
    sequence: Arc<S>,
    directory: AgentDirectoryService<A, C>,
    selector: TargetSelector<A>,
    validator: Arc<dyn ConfigValidator>,
    clock: Arc<C>,
}

impl<D, A, S, C> DeploymentService<D, A, S, C>
where
    D: DeploymentRepository,
    A: AgentRepository,
    S: VersionSequence,
    C: Clock + Send + Sync,
{
    /// Creates a new deployment service.
    #[must_use]
    pub fn new(
        deployments: Arc<D>,
        sequence: Arc<S>,
        agents: Arc<A>,
        validator: Arc<dyn ConfigValidator>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            deployments,
            sequence,
            directory: AgentDirectoryService::new(Arc::clone(&agents), Arc::clone(&clock)),
            selector: TargetSelector::new(agents),
            validator,
            clock,
        }
    }

    /// Validates, versions, and fans out a new deployment, then pushes it
    /// to the first cohort.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentServiceError::InvalidConfig`] when validation
    /// fails without an override, a domain error for an invalid name,
    /// strategy or tag, or a store error.
    pub async fn create_deployment(
        &self,
        request: CreateDeploymentRequest,
    ) -> DeploymentServiceResult<ConfigDeployment> {
        let CreateDeploymentRequest {
            org_id,
            name,
            content,
            strategy,
            target_tags,
            tag_match,
            ignore_validation,
        } = request;
        let deployment_name = DeploymentName::new(&name)?;
        strategy.validate()?;
        let tags = target_tags
            .iter()
            .map(AgentTag::new)
            .collect::<Result<Vec<_>, _>>()?;

        let report = self.validator.validate(&content);
        if !report.is_valid() {
            if !ignore_validation {
                return Err(DeploymentServiceError::InvalidConfig(report));
            }
            warn!(
                %org_id,
                errors = report.errors().len(),
                "deploying configuration that failed validation"
            );
        }

        let version = self.sequence.next_version().await?;
        let deployment = ConfigDeployment::new(
            NewDeployment {
                org_id,
                name: deployment_name,
                version,
                content,
                strategy,
                target_tags: tags,
                tag_match,
                validation_overridden: !report.is_valid(),
            },
            &*self.clock,
        );
        let cohort = self
            .selector
            .select_cohort(
                org_id,
                deployment.target_tags(),
                deployment.tag_match(),
                deployment.current_percentage(),
            )
            .await?;
        let audits = cohort
            .iter()
            .map(|agent| self.pending_audit(&deployment, agent.id()))
            .collect::<Vec<_>>();
        self.deployments.insert(&deployment, &audits).await?;
        info!(
            deployment_id = %deployment.id(),
            %org_id,
            %version,
            strategy = deployment.strategy().kind(),
            targets = audits.len(),
            "deployment created"
        );
        self.push_to_agents(deployment.id()).await
    }

    /// Starts delivery: marks the deployment in progress and points every
    /// pending target at it. Agents pick it up on their next exchange.
    ///
    /// A deployment with no targets completes immediately.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentServiceError::NotFound`],
    /// [`DeploymentServiceError::DeploymentClosed`], or a store error.
    pub async fn push_to_agents(&self, id: DeploymentId) -> DeploymentServiceResult<ConfigDeployment> {
        let mut deployment = self.load(id).await?;
        ensure_open(&deployment)?;
        let audits = self.deployments.list_audits(id).await?;
        if deployment.status() == DeploymentStatus::Pending {
            let next = if audits.is_empty() {
                DeploymentStatus::Completed
            } else {
                DeploymentStatus::InProgress
            };
            deployment.transition_to(next, &*self.clock)?;
            self.deployments.update(&deployment).await?;
        }
        let targets = audits
            .iter()
            .filter(|audit| audit.status() == AuditStatus::Pending)
            .map(ConfigAudit::agent_id)
            .collect::<Vec<_>>();
        self.stamp_targets(&deployment, &targets).await?;
        debug!(deployment_id = %id, targets = targets.len(), "deployment pushed");
        Ok(deployment)
    }

    /// Adds explicitly chosen agents of the deployment's organisation to an
    /// open deployment. Agents already targeted are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentServiceError::UnknownAgent`] or
    /// [`DeploymentServiceError::AgentNotInOrg`] before any row is written,
    /// [`DeploymentServiceError::DeploymentClosed`], or a store error.
    pub async fn direct_push(
        &self,
        id: DeploymentId,
        agent_ids: &[AgentId],
    ) -> DeploymentServiceResult<Vec<ConfigAudit>> {
        let mut deployment = self.load(id).await?;
        ensure_open(&deployment)?;
        let mut covered = self
            .deployments
            .list_audits(id)
            .await?
            .iter()
            .map(ConfigAudit::agent_id)
            .collect::<BTreeSet<_>>();

        let mut added = Vec::new();
        for agent_id in agent_ids {
            let agent = self
                .directory
                .find(*agent_id)
                .await?
                .ok_or(DeploymentServiceError::UnknownAgent(*agent_id))?;
            if agent.org_id() != deployment.org_id() {
                return Err(DeploymentServiceError::AgentNotInOrg {
                    agent_id: *agent_id,
                    org_id: deployment.org_id(),
                });
            }
            if covered.insert(*agent_id) {
                added.push(self.pending_audit(&deployment, *agent_id));
            }
        }

        self.deployments.insert_audits(&added).await?;
        if deployment.status() == DeploymentStatus::Pending && !added.is_empty() {
            deployment.transition_to(DeploymentStatus::InProgress, &*self.clock)?;
            self.deployments.update(&deployment).await?;
        }
        let targets = added.iter().map(ConfigAudit::agent_id).collect::<Vec<_>>();
        self.stamp_targets(&deployment, &targets).await?;
        info!(deployment_id = %id, added = added.len(), "direct push recorded");
        Ok(added)
    }

    /// Expands a canary or staged rollout to its next stage.
    ///
    /// With a gate, the agents already targeted must meet its success
    /// share for this deployment's hash first.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentServiceError::HealthGateFailed`] with the report
    /// when the gate is not met, [`DeploymentServiceError::NoFurtherStage`]
    /// at the final stage, [`DeploymentServiceError::DeploymentClosed`], or
    /// a store error.
    pub async fn advance_stage(
        &self,
        id: DeploymentId,
        gate: Option<HealthGate>,
    ) -> DeploymentServiceResult<StageAdvance> {
        let mut deployment = self.load(id).await?;
        ensure_open(&deployment)?;
        if deployment.at_final_stage() {
            return Err(DeploymentServiceError::NoFurtherStage(id));
        }
        let existing = self.deployments.list_audits(id).await?;

        let mut health = None;
        if let Some(gate) = gate {
            let cohort = self.audited_agents(&existing).await?;
            let report = CanaryHealthMonitor::new(gate).evaluate(deployment.hash(), &cohort);
            if !report.passed {
                warn!(
                    deployment_id = %id,
                    succeeded = report.succeeded,
                    cohort = report.cohort_size,
                    "health gate blocked stage advance"
                );
                return Err(DeploymentServiceError::HealthGateFailed(report));
            }
            health = Some(report);
        }

        let percentage = deployment
            .advance_stage(&*self.clock)
            .ok_or(DeploymentServiceError::NoFurtherStage(id))?;
        let audited = existing
            .iter()
            .map(ConfigAudit::agent_id)
            .collect::<BTreeSet<_>>();
        let added = self
            .selector
            .select_cohort(
                deployment.org_id(),
                deployment.target_tags(),
                deployment.tag_match(),
                percentage,
            )
            .await?
            .iter()
            .filter(|agent| !audited.contains(&agent.id()))
            .map(|agent| self.pending_audit(&deployment, agent.id()))
            .collect::<Vec<_>>();

        self.deployments.insert_audits(&added).await?;
        if deployment.status() == DeploymentStatus::Pending {
            deployment.transition_to(DeploymentStatus::InProgress, &*self.clock)?;
        }
        self.deployments.update(&deployment).await?;
        let targets = added.iter().map(ConfigAudit::agent_id).collect::<Vec<_>>();
        self.stamp_targets(&deployment, &targets).await?;
        info!(
            deployment_id = %id,
            stage = deployment.current_stage(),
            percentage,
            added = added.len(),
            "rollout advanced"
        );

        if self.reconcile(id).await?.is_some() {
            deployment = self.load(id).await?;
        }
        Ok(StageAdvance {
            deployment,
            percentage,
            added,
            health,
        })
    }

    /// Rolls a deployment back.
    ///
    /// Still-open rows are withdrawn. Each targeted agent still directed at
    /// this deployment is pointed back at its newest earlier applied
    /// configuration; an agent without one keeps its current target.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentServiceError::NotFound`], a domain error when the
    /// deployment was already rolled back, or a store error.
    pub async fn rollback(&self, id: DeploymentId) -> DeploymentServiceResult<RollbackSummary> {
        let mut deployment = self.load(id).await?;
        deployment.transition_to(DeploymentStatus::RolledBack, &*self.clock)?;
        self.deployments.update(&deployment).await?;

        let mut summary = RollbackSummary::default();
        for audit in self.deployments.list_audits(id).await? {
            let agent_id = audit.agent_id();
            let (_, withdrawn) = self
                .rewrite_audit(audit, |row, clock| {
                    let changed = row.withdraw(clock);
                    (changed, changed)
                })
                .await?;
            if withdrawn {
                summary.withdrawn += 1;
            }
            match self.rearm_previous(agent_id, &deployment).await? {
                RearmOutcome::Rearmed(target) => summary.rearmed.push(target),
                RearmOutcome::Untargeted => summary.untargeted.push(agent_id),
                RearmOutcome::Superseded => summary.superseded.push(agent_id),
            }
        }
        info!(
            deployment_id = %id,
            version = %deployment.version(),
            withdrawn = summary.withdrawn,
            rearmed = summary.rearmed.len(),
            untargeted = summary.untargeted.len(),
            "deployment rolled back"
        );
        Ok(summary)
    }

    /// Returns a deployment with its delivery counts.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentServiceError::NotFound`] or a store error.
    pub async fn get_status(&self, id: DeploymentId) -> DeploymentServiceResult<DeploymentStatusReport> {
        let deployment = self.load(id).await?;
        let audits = self.deployments.list_audits(id).await?;
        Ok(DeploymentStatusReport {
            deployment,
            progress: DeploymentProgress::from_audits(&audits),
        })
    }

    /// Returns a deployment's audit rows ordered by agent.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentServiceError::NotFound`] or a store error.
    pub async fn get_audit(&self, id: DeploymentId) -> DeploymentServiceResult<Vec<ConfigAudit>> {
        self.load(id).await?;
        Ok(self.deployments.list_audits(id).await?)
    }

    /// Lists an organisation's deployments, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error when lookup fails.
    pub async fn list_deployments(&self, org_id: OrgId) -> DeploymentServiceResult<Vec<ConfigDeployment>> {
        Ok(self.deployments.list_by_org(org_id).await?)
    }

    /// Claims the agent's newest pending row and marks it applying.
    ///
    /// Rows older than the configuration the agent is currently directed
    /// at are left pending and not sent. Returns `None` when nothing is
    /// due or another writer moved the row first.
    ///
    /// # Errors
    ///
    /// Returns a store error when lookup or the conditional write fails.
    pub async fn claim_delivery(&self, agent: &Agent) -> DeploymentServiceResult<Option<PendingDelivery>> {
        let Some(mut audit) = self.deployments.next_pending_audit(agent.id()).await? else {
            return Ok(None);
        };
        if agent
            .last_config_version()
            .is_some_and(|directed| audit.version() < directed)
        {
            debug!(
                agent_id = %agent.id(),
                version = %audit.version(),
                "pending row predates the directed configuration; not sent"
            );
            return Ok(None);
        }
        let deployment = self.load(audit.deployment_id()).await?;
        audit.mark_sent(&*self.clock)?;
        match self.deployments.update_audit(&audit, AuditStatus::Pending).await {
            Ok(()) => Ok(Some(PendingDelivery { audit, deployment })),
            Err(DeploymentRepositoryError::StaleAudit { .. }) => {
                debug!(agent_id = %agent.id(), "pending row moved before it was claimed");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Applies an agent's remote-config report to the row with the same
    /// content hash.
    ///
    /// Reports naming a hash with no row are ignored, as are reports for a
    /// rolled-back deployment. When the row settles, the deployment is
    /// reconciled.
    ///
    /// # Errors
    ///
    /// Returns a store error when lookup or the write fails.
    pub async fn record_agent_report(
        &self,
        agent_id: AgentId,
        reported: AuditStatus,
        hash: ConfigHash,
        message: Option<String>,
    ) -> DeploymentServiceResult<Option<(ConfigAudit, AuditReportOutcome)>> {
        let Some(audit) = self.deployments.find_audit_by_hash(agent_id, hash).await? else {
            debug!(%agent_id, %hash, "report names no delivered configuration; ignored");
            return Ok(None);
        };
        let rolled_back = self
            .deployments
            .find(audit.deployment_id())
            .await?
            .is_some_and(|deployment| deployment.status() == DeploymentStatus::RolledBack);
        if rolled_back {
            debug!(
                %agent_id,
                deployment_id = %audit.deployment_id(),
                "report names a rolled-back configuration; ignored"
            );
            return Ok(Some((audit, AuditReportOutcome::Ignored)));
        }
        let (updated, outcome) = self
            .rewrite_audit(audit, |row, clock| {
                let outcome = row.record_report(reported, message.clone(), clock);
                (outcome, matches!(outcome, AuditReportOutcome::Changed { .. }))
            })
            .await?;
        if let AuditReportOutcome::Changed { from } = outcome {
            debug!(
                %agent_id,
                deployment_id = %updated.deployment_id(),
                %from,
                to = %updated.status(),
                "audit row updated"
            );
            if updated.status().is_terminal() {
                self.reconcile(updated.deployment_id()).await?;
            }
        }
        Ok(Some((updated, outcome)))
    }

    /// Completes or fails an in-progress deployment at its final stage once
    /// every row has settled.
    ///
    /// Returns the new status when one was set.
    ///
    /// # Errors
    ///
    /// Returns a store error when lookup or the write fails.
    pub async fn reconcile(&self, id: DeploymentId) -> DeploymentServiceResult<Option<DeploymentStatus>> {
        let Some(mut deployment) = self.deployments.find(id).await? else {
            return Ok(None);
        };
        if deployment.status() != DeploymentStatus::InProgress || !deployment.at_final_stage() {
            return Ok(None);
        }
        let progress = DeploymentProgress::from_audits(&self.deployments.list_audits(id).await?);
        if progress.total == 0 || !progress.is_settled() {
            return Ok(None);
        }
        let next = if progress.applied > 0 {
            DeploymentStatus::Completed
        } else {
            DeploymentStatus::Failed
        };
        deployment.transition_to(next, &*self.clock)?;
        self.deployments.update(&deployment).await?;
        info!(
            deployment_id = %id,
            status = %next,
            applied = progress.applied,
            failed = progress.failed,
            "deployment settled"
        );
        Ok(Some(next))
    }

    fn pending_audit(&self, deployment: &ConfigDeployment, agent_id: AgentId) -> ConfigAudit {
        ConfigAudit::pending(
            deployment.id(),
            deployment.org_id(),
            deployment.version(),
            deployment.hash(),
            agent_id,
            &*self.clock,
        )
    }

    async fn load(&self, id: DeploymentId) -> DeploymentServiceResult<ConfigDeployment> {
        self.deployments
            .find(id)
            .await?
            .ok_or(DeploymentServiceError::NotFound(id))
    }

    async fn audited_agents(&self, audits: &[ConfigAudit]) -> DeploymentServiceResult<Vec<Agent>> {
        let mut agents = Vec::with_capacity(audits.len());
        for audit in audits {
            if let Some(agent) = self.directory.find(audit.agent_id()).await? {
                agents.push(agent);
            }
        }
        Ok(agents)
    }

    /// Points agents at `deployment` unless they already target a newer
    /// version. Per-agent failures other than store outages are logged and
    /// skipped.
    async fn stamp_targets(
        &self,
        deployment: &ConfigDeployment,
        agent_ids: &[AgentId],
    ) -> DeploymentServiceResult<()> {
        let target = ConfigTarget {
            deployment_id: deployment.id(),
            version: deployment.version(),
            hash: deployment.hash(),
        };
        for agent_id in agent_ids {
            let stamped = self
                .directory
                .modify(*agent_id, |agent, clock| {
                    if agent
                        .last_config_version()
                        .is_none_or(|current| current <= target.version)
                    {
                        agent.assign_config_target(target, clock);
                    }
                })
                .await;
            match stamped {
                Ok(_) => {}
                Err(err) if err.is_store_failure() => return Err(err.into()),
                Err(err) => warn!(
                    %agent_id,
                    deployment_id = %target.deployment_id,
                    error = %err,
                    "could not stamp configuration target"
                ),
            }
        }
        Ok(())
    }

    async fn rearm_previous(
        &self,
        agent_id: AgentId,
        rolled_back: &ConfigDeployment,
    ) -> DeploymentServiceResult<RearmOutcome> {
        let Some(agent) = self.directory.find(agent_id).await? else {
            return Ok(RearmOutcome::Untargeted);
        };
        if agent
            .config_target()
            .is_some_and(|target| target.deployment_id != rolled_back.id())
        {
            return Ok(RearmOutcome::Superseded);
        }

        for candidate in self.deployments.list_audits_for_agent(agent_id).await? {
            if candidate.status() != AuditStatus::Applied
                || candidate.version() >= rolled_back.version()
            {
                continue;
            }
            let Some(previous) = self.deployments.find(candidate.deployment_id()).await? else {
                continue;
            };
            if previous.status() == DeploymentStatus::RolledBack {
                continue;
            }

            let reason = format!("re-armed by rollback of version {}", rolled_back.version());
            let (_, rearmed) = self
                .rewrite_audit(candidate, |row, clock| {
                    let moved = row.rearm(reason.clone(), clock).is_ok();
                    (moved, moved)
                })
                .await?;
            if !rearmed {
                continue;
            }

            let target = ConfigTarget {
                deployment_id: previous.id(),
                version: previous.version(),
                hash: previous.hash(),
            };
            let rolled_back_id = rolled_back.id();
            self.directory
                .modify(agent_id, |agent, clock| {
                    if agent
                        .config_target()
                        .is_none_or(|current| current.deployment_id == rolled_back_id)
                    {
                        agent.assign_config_target(target, clock);
                    }
                })
                .await?;
            debug!(%agent_id, version = %previous.version(), "previous configuration re-armed");
            return Ok(RearmOutcome::Rearmed(RearmedTarget {
                agent_id,
                deployment_id: previous.id(),
                version: previous.version(),
            }));
        }
        Ok(RearmOutcome::Untargeted)
    }

    /// Applies `mutate` and writes the row if it asks to, conditional on
    /// the status it was read with. A lost race re-reads the row and runs
    /// `mutate` again, up to [`MAX_WRITE_ATTEMPTS`] times.
    async fn rewrite_audit<T, F>(
        &self,
        mut audit: ConfigAudit,
        mut mutate: F,
    ) -> DeploymentServiceResult<(ConfigAudit, T)>
    where
        F: FnMut(&mut ConfigAudit, &C) -> (T, bool) + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            let expected = audit.status();
            let (outcome, write) = mutate(&mut audit, &*self.clock);
            if !write {
                return Ok((audit, outcome));
            }
            match self.deployments.update_audit(&audit, expected).await {
                Ok(()) => return Ok((audit, outcome)),
                Err(DeploymentRepositoryError::StaleAudit { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(agent_id = %audit.agent_id(), attempt, "audit write conflicted; retrying");
                    attempt += 1;
                    audit = self.reload_audit(&audit).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn reload_audit(&self, audit: &ConfigAudit) -> DeploymentServiceResult<ConfigAudit> {
        let deployment_id = audit.deployment_id();
        let agent_id = audit.agent_id();
        self.deployments
            .list_audits_for_agent(agent_id)
            .await?
            .into_iter()
            .find(|row| row.deployment_id() == deployment_id)
            .ok_or(DeploymentServiceError::Repository(
                DeploymentRepositoryError::AuditNotFound {
                    deployment_id,
                    agent_id,
                },
            ))
    }
}

fn ensure_open(deployment: &ConfigDeployment) -> DeploymentServiceResult<()> {
    if deployment.status().is_open() {
        return Ok(());
    }
    Err(DeploymentServiceError::DeploymentClosed {
        id: deployment.id(),
        status: deployment.status(),
    })
}
