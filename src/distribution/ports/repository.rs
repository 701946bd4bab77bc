//! Repository port for package and connection-settings ledgers.

use crate::agent::domain::{AgentId, OrgId};
use crate::distribution::domain::{
    ConnectionSettingsOffer, PackageOffer, PackageRecord, SettingsRecord,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for distribution repository operations.
pub type DistributionRepositoryResult<T> = Result<T, DistributionRepositoryError>;

/// Persistence contract for offers and per-agent records.
///
/// Offers are keyed by organisation (and package name); records by agent
/// (and package name). Saving replaces any existing entry with the same
/// key.
#[async_trait]
pub trait DistributionRepository: Send + Sync {
    /// Stores a package offer, replacing the organisation's previous offer
    /// of the same name.
    async fn save_package_offer(&self, offer: &PackageOffer) -> DistributionRepositoryResult<()>;

    /// Lists an organisation's package offers ordered by name.
    async fn list_package_offers(
        &self,
        org_id: OrgId,
    ) -> DistributionRepositoryResult<Vec<PackageOffer>>;

    /// Stores package records.
    async fn save_package_records(
        &self,
        records: &[PackageRecord],
    ) -> DistributionRepositoryResult<()>;

    /// Lists an agent's package records ordered by package name.
    async fn list_package_records(
        &self,
        agent_id: AgentId,
    ) -> DistributionRepositoryResult<Vec<PackageRecord>>;

    /// Stores the organisation's connection settings.
    async fn save_settings_offer(
        &self,
        offer: &ConnectionSettingsOffer,
    ) -> DistributionRepositoryResult<()>;

    /// Returns the organisation's connection settings, if any.
    async fn find_settings_offer(
        &self,
        org_id: OrgId,
    ) -> DistributionRepositoryResult<Option<ConnectionSettingsOffer>>;

    /// Stores an agent's settings record.
    async fn save_settings_record(&self, record: &SettingsRecord)
    -> DistributionRepositoryResult<()>;

    /// Returns an agent's settings record, if any.
    async fn find_settings_record(
        &self,
        agent_id: AgentId,
    ) -> DistributionRepositoryResult<Option<SettingsRecord>>;
}

/// Errors returned by distribution repository implementations.
#[derive(Debug, Clone, Error)]
pub enum DistributionRepositoryError {
    /// The backing store failed.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl DistributionRepositoryError {
    /// Wraps an infrastructure error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
