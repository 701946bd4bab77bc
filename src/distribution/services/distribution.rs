//! Publishing offers and tracking their delivery per agent.
//!
//! Records are written without a conditional check: every write is scoped
//! to one agent, and an agent's protocol messages are handled one at a
//! time.

use crate::agent::domain::{Agent, AgentId, OrgId};
use crate::distribution::{
    domain::{
        ConnectionSettingsOffer, DeliveryReport, DistributionDomainError, PackageKind,
        PackageName, PackageOffer, PackageRecord, PackageStatus, ReportedPackage,
        ReportedSettings, SettingsRecord, SettingsStatus,
    },
    ports::{DistributionRepository, DistributionRepositoryError},
};
use crate::pipeline::domain::ConfigHash;
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Request payload for publishing a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPackageRequest {
    org_id: OrgId,
    name: String,
    version: String,
    download_url: String,
    hash: ConfigHash,
    kind: PackageKind,
}

impl PublishPackageRequest {
    /// Creates a request for an add-on package.
    #[must_use]
    pub fn new(
        org_id: OrgId,
        name: impl Into<String>,
        version: impl Into<String>,
        download_url: impl Into<String>,
        hash: ConfigHash,
    ) -> Self {
        Self {
            org_id,
            name: name.into(),
            version: version.into(),
            download_url: download_url.into(),
            hash,
            kind: PackageKind::Addon,
        }
    }

    /// Sets the package kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: PackageKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Packages to send to one agent.
///
/// The agent always receives the organisation's full offer set; `hash`
/// summarises that set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDelivery {
    /// Every package currently offered to the organisation.
    pub offers: Vec<PackageOffer>,
    /// Digest over every offer's name and hash.
    pub hash: ConfigHash,
}

/// Service-level errors for distribution operations.
#[derive(Debug, Error)]
pub enum DistributionError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] DistributionDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] DistributionRepositoryError),
}

impl DistributionError {
    /// Returns `true` when the backing store itself failed.
    #[must_use]
    pub const fn is_store_failure(&self) -> bool {
        matches!(self, Self::Repository(_))
    }
}

/// Result type for distribution service operations.
pub type DistributionResult<T> = Result<T, DistributionError>;

/// Package and connection-settings orchestration service.
pub struct DistributionService<R, C>
where
    R: DistributionRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
}

impl<R, C> Clone for DistributionService<R, C>
where
    R: DistributionRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R, C> DistributionService<R, C>
where
    R: DistributionRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new distribution service.
    #[must_use]
    pub const fn new(repository: Arc<R>, clock: Arc<C>) -> Self {
        Self { repository, clock }
    }

    /// Publishes a package, replacing any earlier offer of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::Domain`] for an invalid name or URL, or
    /// [`DistributionError::Repository`] when persistence fails.
    pub async fn publish_package(
        &self,
        request: PublishPackageRequest,
    ) -> DistributionResult<PackageOffer> {
        let PublishPackageRequest {
            org_id,
            name,
            version,
            download_url,
            hash,
            kind,
        } = request;
        let offer = PackageOffer::new(
            org_id,
            PackageName::new(name)?,
            version,
            download_url,
            hash,
            kind,
            &*self.clock,
        )?;
        self.repository.save_package_offer(&offer).await?;
        info!(
            %org_id,
            package = %offer.name(),
            version = offer.version(),
            %hash,
            "package published"
        );
        Ok(offer)
    }

    /// Publishes connection settings for an organisation.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::Repository`] when persistence fails.
    pub async fn publish_connection_settings(
        &self,
        offer: &ConnectionSettingsOffer,
    ) -> DistributionResult<()> {
        self.repository.save_settings_offer(offer).await?;
        info!(org_id = %offer.org_id(), hash = %offer.hash(), "connection settings published");
        Ok(())
    }

    /// Returns the package offers the agent still has to act on, marking
    /// each newly sent one as installing.
    ///
    /// Returns `None` when every offer was already sent.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::Repository`] when lookup or the write
    /// fails.
    pub async fn claim_packages(&self, agent: &Agent) -> DistributionResult<Option<PackageDelivery>> {
        let offers = self.repository.list_package_offers(agent.org_id()).await?;
        if offers.is_empty() {
            return Ok(None);
        }
        let mut records = self.repository.list_package_records(agent.id()).await?;
        let mut sent = Vec::new();
        for offer in &offers {
            let position = records
                .iter()
                .position(|record| record.package() == offer.name());
            let mut record = position
                .map(|index| records.swap_remove(index))
                .unwrap_or_else(|| {
                    PackageRecord::new(agent.id(), offer.name().clone(), &*self.clock)
                });
            if record.delivery_mut().offer(offer.hash(), &*self.clock) {
                sent.push(record);
            }
        }
        if sent.is_empty() {
            return Ok(None);
        }
        self.repository.save_package_records(&sent).await?;
        debug!(agent_id = %agent.id(), packages = sent.len(), "package offers sent");
        Ok(Some(PackageDelivery {
            hash: offer_set_hash(&offers),
            offers,
        }))
    }

    /// Returns the organisation's connection settings when the agent has
    /// not yet been sent them, marking the agent's record applying.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::Repository`] when lookup or the write
    /// fails.
    pub async fn claim_connection_settings(
        &self,
        agent: &Agent,
    ) -> DistributionResult<Option<ConnectionSettingsOffer>> {
        let Some(offer) = self.repository.find_settings_offer(agent.org_id()).await? else {
            return Ok(None);
        };
        let mut record = self
            .repository
            .find_settings_record(agent.id())
            .await?
            .unwrap_or_else(|| SettingsRecord::new(agent.id(), &*self.clock));
        if !record.delivery_mut().offer(offer.hash(), &*self.clock) {
            return Ok(None);
        }
        self.repository.save_settings_record(&record).await?;
        debug!(agent_id = %agent.id(), hash = %offer.hash(), "connection settings sent");
        Ok(Some(offer))
    }

    /// Applies an agent's package status reports.
    ///
    /// Reports for packages that were never offered to the agent are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::Repository`] when lookup or the write
    /// fails.
    pub async fn record_package_statuses(
        &self,
        agent_id: AgentId,
        reports: Vec<ReportedPackage>,
    ) -> DistributionResult<Vec<(PackageName, DeliveryReport<PackageStatus>)>> {
        let mut records = self.repository.list_package_records(agent_id).await?;
        let mut outcomes = Vec::with_capacity(reports.len());
        let mut changed = Vec::new();
        for report in reports {
            let Some(record) = records
                .iter_mut()
                .find(|record| record.package().as_str() == report.name.trim())
            else {
                debug!(%agent_id, package = %report.name, "status for unoffered package ignored");
                continue;
            };
            let outcome = record.delivery_mut().record_report(
                report.status,
                report.hash,
                report.error_message,
                &*self.clock,
            );
            if matches!(outcome, DeliveryReport::Changed { .. }) {
                changed.push(record.clone());
            }
            outcomes.push((record.package().clone(), outcome));
        }
        if !changed.is_empty() {
            self.repository.save_package_records(&changed).await?;
        }
        Ok(outcomes)
    }

    /// Applies an agent's connection-settings status report.
    ///
    /// A report from an agent that was never sent settings is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::Repository`] when lookup or the write
    /// fails.
    pub async fn record_settings_status(
        &self,
        agent_id: AgentId,
        report: ReportedSettings,
    ) -> DistributionResult<DeliveryReport<SettingsStatus>> {
        let Some(mut record) = self.repository.find_settings_record(agent_id).await? else {
            return Ok(DeliveryReport::Ignored);
        };
        let outcome = record.delivery_mut().record_report(
            report.status,
            report.hash,
            report.error_message,
            &*self.clock,
        );
        if matches!(outcome, DeliveryReport::Changed { .. }) {
            self.repository.save_settings_record(&record).await?;
        }
        Ok(outcome)
    }

    /// Lists an agent's package records.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::Repository`] when lookup fails.
    pub async fn package_records(&self, agent_id: AgentId) -> DistributionResult<Vec<PackageRecord>> {
        Ok(self.repository.list_package_records(agent_id).await?)
    }

    /// Returns an agent's connection-settings record.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::Repository`] when lookup fails.
    pub async fn settings_record(&self, agent_id: AgentId) -> DistributionResult<Option<SettingsRecord>> {
        Ok(self.repository.find_settings_record(agent_id).await?)
    }
}

fn offer_set_hash(offers: &[PackageOffer]) -> ConfigHash {
    let mut summary = Vec::new();
    for offer in offers {
        summary.extend_from_slice(offer.name().as_str().as_bytes());
        summary.push(0);
        summary.extend_from_slice(offer.hash().as_bytes());
    }
    ConfigHash::of(&summary)
}
