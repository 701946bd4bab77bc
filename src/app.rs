//! Service wiring shared by the binary and integration tests.

use crate::agent::{
    adapters::memory::InMemoryAgentRepository,
    domain::{Agent, OrgId},
    ports::AgentRepository,
    services::{AgentDirectoryResult, AgentDirectoryService},
};
use crate::capability::ServerCapabilities;
use crate::config::EnrollmentFile;
use crate::distribution::{
    adapters::memory::InMemoryDistributionRepository,
    domain::ConnectionSettingsOffer,
    ports::DistributionRepository,
    services::{DistributionResult, DistributionService},
};
use crate::opamp::{MessageProcessor, ProtocolHandler};
use crate::pipeline::validation::DefaultConfigValidator;
use crate::rollout::{
    adapters::memory::{AtomicVersionSequence, InMemoryDeploymentRepository},
    ports::{DeploymentRepository, VersionSequence},
    services::DeploymentService,
};
use mockable::{Clock, DefaultClock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Every service of a running control plane over one set of stores.
pub struct ControlPlane<A, D, S, P, C>
where
    A: AgentRepository,
    D: DeploymentRepository,
    S: VersionSequence,
    P: DistributionRepository,
    C: Clock + Send + Sync,
{
    directory: AgentDirectoryService<A, C>,
    deployments: Arc<DeploymentService<D, A, S, C>>,
    distribution: Arc<DistributionService<P, C>>,
    processor: Arc<MessageProcessor<A, D, S, P, C>>,
}

/// A control plane backed entirely by in-memory stores.
pub type InMemoryControlPlane = ControlPlane<
    InMemoryAgentRepository,
    InMemoryDeploymentRepository,
    AtomicVersionSequence,
    InMemoryDistributionRepository,
    DefaultClock,
>;

impl<A, D, S, P, C> ControlPlane<A, D, S, P, C>
where
    A: AgentRepository,
    D: DeploymentRepository,
    S: VersionSequence,
    P: DistributionRepository,
    C: Clock + Send + Sync,
{
    /// Wires the services over the given stores.
    #[must_use]
    pub fn new(
        agents: Arc<A>,
        deployments: Arc<D>,
        sequence: Arc<S>,
        distribution: Arc<P>,
        clock: Arc<C>,
        capabilities: ServerCapabilities,
    ) -> Self {
        let directory = AgentDirectoryService::new(Arc::clone(&agents), Arc::clone(&clock));
        let deployments = Arc::new(DeploymentService::new(
            deployments,
            sequence,
            agents,
            Arc::new(DefaultConfigValidator::new()),
            Arc::clone(&clock),
        ));
        let distribution = Arc::new(DistributionService::new(distribution, clock));
        let processor = Arc::new(MessageProcessor::new(
            directory.clone(),
            Arc::clone(&deployments),
            Arc::clone(&distribution),
            capabilities,
        ));
        Self {
            directory,
            deployments,
            distribution,
            processor,
        }
    }

    /// Agent directory.
    #[must_use]
    pub const fn directory(&self) -> &AgentDirectoryService<A, C> {
        &self.directory
    }

    /// Deployment engine.
    #[must_use]
    pub fn deployments(&self) -> &DeploymentService<D, A, S, C> {
        &self.deployments
    }

    /// Package and connection-settings distribution.
    #[must_use]
    pub fn distribution(&self) -> &DistributionService<P, C> {
        &self.distribution
    }

    /// Registers every agent in an enrollment file.
    ///
    /// Registration is idempotent, so re-running it on restart refreshes
    /// names, tags, and deployment modes.
    ///
    /// # Errors
    ///
    /// Returns the first registration failure.
    pub async fn enroll(&self, file: &EnrollmentFile) -> AgentDirectoryResult<Vec<Agent>> {
        let mut agents = Vec::with_capacity(file.entries().len());
        for request in file.registrations() {
            agents.push(self.directory.register(request).await?);
        }
        info!(count = agents.len(), "enrolled agents registered");
        Ok(agents)
    }

    /// Publishes connection settings carrying the heartbeat interval to
    /// each organisation.
    ///
    /// # Errors
    ///
    /// Returns a domain error for a zero interval or the first store
    /// failure.
    pub async fn offer_heartbeat(
        &self,
        organisations: impl IntoIterator<Item = OrgId> + Send,
        heartbeat_interval_secs: u64,
    ) -> DistributionResult<usize> {
        let mut published = 0;
        for org_id in organisations {
            let offer =
                ConnectionSettingsOffer::new(org_id, None, heartbeat_interval_secs, BTreeMap::new())?;
            self.distribution.publish_connection_settings(&offer).await?;
            published += 1;
        }
        Ok(published)
    }
}

impl<A, D, S, P, C> ControlPlane<A, D, S, P, C>
where
    A: AgentRepository + 'static,
    D: DeploymentRepository + 'static,
    S: VersionSequence + 'static,
    P: DistributionRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Protocol handler for the transport.
    #[must_use]
    pub fn handler(&self) -> Arc<dyn ProtocolHandler> {
        Arc::clone(&self.processor) as Arc<dyn ProtocolHandler>
    }
}

impl InMemoryControlPlane {
    /// Creates a control plane with fresh in-memory stores.
    #[must_use]
    pub fn in_memory(capabilities: ServerCapabilities) -> Self {
        Self::new(
            Arc::new(InMemoryAgentRepository::new()),
            Arc::new(InMemoryDeploymentRepository::new()),
            Arc::new(AtomicVersionSequence::new()),
            Arc::new(InMemoryDistributionRepository::new()),
            Arc::new(DefaultClock),
            capabilities,
        )
    }
}
