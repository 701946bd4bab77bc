//! Per-agent delivery ledger row.

use super::{AuditId, AuditStatus, ConfigVersion, DeploymentId, RolloutDomainError};
use crate::agent::domain::{AgentId, OrgId};
use crate::pipeline::domain::ConfigHash;
use chrono::{DateTime, Utc};
use mockable::Clock;

/// Message stored on rows withdrawn by a rollback.
pub const ROLLED_BACK_MESSAGE: &str = "rolled back";

/// Effect of an agent report on an audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditReportOutcome {
    /// The row moved to a new status.
    Changed {
        /// Status before the report.
        from: AuditStatus,
    },
    /// The row already reflected the report.
    Unchanged,
    /// The report would regress a terminal row and was ignored.
    Ignored,
}

/// One (deployment, agent) delivery record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigAudit {
    id: AuditId,
    deployment_id: DeploymentId,
    agent_id: AgentId,
    org_id: OrgId,
    version: ConfigVersion,
    config_hash: ConfigHash,
    status: AuditStatus,
    status_message: Option<String>,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    status_reported_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedAuditData {
    /// Persisted identifier.
    pub id: AuditId,
    /// Deployment delivered.
    pub deployment_id: DeploymentId,
    /// Target agent.
    pub agent_id: AgentId,
    /// Owning organisation.
    pub org_id: OrgId,
    /// Version of the deployment.
    pub version: ConfigVersion,
    /// Hash of the deployment content.
    pub config_hash: ConfigHash,
    /// Delivery status.
    pub status: AuditStatus,
    /// Agent- or rollback-supplied detail.
    pub status_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the configuration was sent.
    pub sent_at: Option<DateTime<Utc>>,
    /// When the agent last reported on it.
    pub status_reported_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ConfigAudit {
    /// Creates a pending row.
    #[must_use]
    pub fn pending(
        deployment_id: DeploymentId,
        org_id: OrgId,
        version: ConfigVersion,
        config_hash: ConfigHash,
        agent_id: AgentId,
        clock: &impl Clock,
    ) -> Self {
        let timestamp = clock.utc();
        Self {
            id: AuditId::new(),
            deployment_id,
            agent_id,
            org_id,
            version,
            config_hash,
            status: AuditStatus::Pending,
            status_message: None,
            created_at: timestamp,
            sent_at: None,
            status_reported_at: None,
            updated_at: timestamp,
        }
    }

    /// Reconstructs a row from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedAuditData) -> Self {
        Self {
            id: data.id,
            deployment_id: data.deployment_id,
            agent_id: data.agent_id,
            org_id: data.org_id,
            version: data.version,
            config_hash: data.config_hash,
            status: data.status,
            status_message: data.status_message,
            created_at: data.created_at,
            sent_at: data.sent_at,
            status_reported_at: data.status_reported_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the row identifier.
    #[must_use]
    pub const fn id(&self) -> AuditId {
        self.id
    }

    /// Returns the deployment delivered.
    #[must_use]
    pub const fn deployment_id(&self) -> DeploymentId {
        self.deployment_id
    }

    /// Returns the target agent.
    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Returns the owning organisation.
    #[must_use]
    pub const fn org_id(&self) -> OrgId {
        self.org_id
    }

    /// Returns the deployment version.
    #[must_use]
    pub const fn version(&self) -> ConfigVersion {
        self.version
    }

    /// Returns the configuration hash.
    #[must_use]
    pub const fn config_hash(&self) -> ConfigHash {
        self.config_hash
    }

    /// Returns the delivery status.
    #[must_use]
    pub const fn status(&self) -> AuditStatus {
        self.status
    }

    /// Returns the status detail.
    #[must_use]
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the configuration was sent.
    #[must_use]
    pub const fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    /// Returns when the agent last reported on this row.
    #[must_use]
    pub const fn status_reported_at(&self) -> Option<DateTime<Utc>> {
        self.status_reported_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Flips a pending row to applying once it has been sent.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutDomainError::InvalidAuditTransition`] unless the row
    /// is pending.
    pub fn mark_sent(&mut self, clock: &impl Clock) -> Result<(), RolloutDomainError> {
        self.require(AuditStatus::Pending, AuditStatus::Applying)?;
        let now = clock.utc();
        self.status = AuditStatus::Applying;
        self.sent_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Applies an agent self-report.
    ///
    /// Applied rows are final for agent reports, so a repeated or late
    /// report never regresses them. A failed row may still move forward
    /// when the agent retries the same configuration.
    pub fn record_report(
        &mut self,
        reported: AuditStatus,
        message: Option<String>,
        clock: &impl Clock,
    ) -> AuditReportOutcome {
        let from = self.status;
        if from == AuditStatus::Applied {
            return if reported == AuditStatus::Applied {
                AuditReportOutcome::Unchanged
            } else {
                AuditReportOutcome::Ignored
            };
        }
        if reported == AuditStatus::Pending {
            return AuditReportOutcome::Ignored;
        }
        if from == reported && self.status_message == message {
            return AuditReportOutcome::Unchanged;
        }
        let now = clock.utc();
        self.status = reported;
        self.status_message = message;
        self.status_reported_at = Some(now);
        self.updated_at = now;
        AuditReportOutcome::Changed { from }
    }

    /// Withdraws a still-open row as part of a rollback.
    ///
    /// Returns `false` for rows that were already terminal.
    pub fn withdraw(&mut self, clock: &impl Clock) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = AuditStatus::Failed;
        self.status_message = Some(ROLLED_BACK_MESSAGE.to_owned());
        self.updated_at = clock.utc();
        true
    }

    /// Re-arms a previously applied row as the agent's pending target.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutDomainError::InvalidAuditTransition`] unless the row
    /// is applied.
    pub fn rearm(
        &mut self,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), RolloutDomainError> {
        self.require(AuditStatus::Applied, AuditStatus::Pending)?;
        self.status = AuditStatus::Pending;
        self.status_message = Some(reason.into());
        self.sent_at = None;
        self.updated_at = clock.utc();
        Ok(())
    }

    fn require(&self, from: AuditStatus, to: AuditStatus) -> Result<(), RolloutDomainError> {
        if self.status != from {
            return Err(RolloutDomainError::InvalidAuditTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}
