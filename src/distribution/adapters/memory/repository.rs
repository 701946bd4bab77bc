//! Thread-safe in-memory distribution repository.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::agent::domain::{AgentId, OrgId};
use crate::distribution::{
    domain::{ConnectionSettingsOffer, PackageName, PackageOffer, PackageRecord, SettingsRecord},
    ports::{DistributionRepository, DistributionRepositoryError, DistributionRepositoryResult},
};

/// In-memory offer and record store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDistributionRepository {
    state: Arc<RwLock<InMemoryDistributionState>>,
}

#[derive(Debug, Default)]
struct InMemoryDistributionState {
    package_offers: HashMap<OrgId, BTreeMap<PackageName, PackageOffer>>,
    package_records: HashMap<AgentId, BTreeMap<PackageName, PackageRecord>>,
    settings_offers: HashMap<OrgId, ConnectionSettingsOffer>,
    settings_records: HashMap<AgentId, SettingsRecord>,
}

impl InMemoryDistributionRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(err: &impl std::fmt::Display) -> DistributionRepositoryError {
    DistributionRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl DistributionRepository for InMemoryDistributionRepository {
    async fn save_package_offer(&self, offer: &PackageOffer) -> DistributionRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| poisoned(&err))?;
        state
            .package_offers
            .entry(offer.org_id())
            .or_default()
            .insert(offer.name().clone(), offer.clone());
        Ok(())
    }

    async fn list_package_offers(
        &self,
        org_id: OrgId,
    ) -> DistributionRepositoryResult<Vec<PackageOffer>> {
        let state = self.state.read().map_err(|err| poisoned(&err))?;
        Ok(state
            .package_offers
            .get(&org_id)
            .map(|offers| offers.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_package_records(
        &self,
        records: &[PackageRecord],
    ) -> DistributionRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| poisoned(&err))?;
        for record in records {
            state
                .package_records
                .entry(record.agent_id())
                .or_default()
                .insert(record.package().clone(), record.clone());
        }
        Ok(())
    }

    async fn list_package_records(
        &self,
        agent_id: AgentId,
    ) -> DistributionRepositoryResult<Vec<PackageRecord>> {
        let state = self.state.read().map_err(|err| poisoned(&err))?;
        Ok(state
            .package_records
            .get(&agent_id)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_settings_offer(
        &self,
        offer: &ConnectionSettingsOffer,
    ) -> DistributionRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| poisoned(&err))?;
        state.settings_offers.insert(offer.org_id(), offer.clone());
        Ok(())
    }

    async fn find_settings_offer(
        &self,
        org_id: OrgId,
    ) -> DistributionRepositoryResult<Option<ConnectionSettingsOffer>> {
        let state = self.state.read().map_err(|err| poisoned(&err))?;
        Ok(state.settings_offers.get(&org_id).cloned())
    }

    async fn save_settings_record(
        &self,
        record: &SettingsRecord,
    ) -> DistributionRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| poisoned(&err))?;
        state
            .settings_records
            .insert(record.agent_id(), record.clone());
        Ok(())
    }

    async fn find_settings_record(
        &self,
        agent_id: AgentId,
    ) -> DistributionRepositoryResult<Option<SettingsRecord>> {
        let state = self.state.read().map_err(|err| poisoned(&err))?;
        Ok(state.settings_records.get(&agent_id).cloned())
    }
}
