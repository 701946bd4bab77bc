//! The OpAMP message state machine.
//!
//! Each inbound message drives independent field-level updates on the
//! agent, its audit rows, and the distribution ledgers; one response is
//! then built from the resulting state.

use super::codec::{DecodeTier, DecodedMessage};
use super::convert::{
    description_from_wire, effective_config_from_wire, health_from_wire, packages_from_wire,
    packages_to_wire, remote_config_from_wire, remote_config_to_wire, settings_from_wire,
    settings_to_wire,
};
use super::error::{ProcessingError, ProcessingResult};
use super::proto::{AgentToServer, AgentToServerFlags, ServerToAgent, ServerToAgentFlags};
use super::session::{Principal, ProtocolHandler, Session};
use crate::agent::{
    domain::{
        Agent, CapabilityUpdate, ConnectionStatus, InstanceUid, SequenceObservation,
        TransportType,
    },
    ports::AgentRepository,
    services::AgentDirectoryService,
};
use crate::capability::{AgentCapabilities, ServerCapabilities};
use crate::distribution::{ports::DistributionRepository, services::DistributionService};
use crate::rollout::{
    domain::AuditStatus,
    ports::{DeploymentRepository, VersionSequence},
    services::DeploymentService,
};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the directory write observed about the message.
struct Observation {
    sequence: SequenceObservation,
    capabilities: Option<CapabilityUpdate>,
}

/// Processes agent messages against the directory, the deployment
/// engine, and the distribution ledgers.
pub struct MessageProcessor<A, D, S, P, C>
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
    capabilities: ServerCapabilities,
}

impl<A, D, S, P, C> MessageProcessor<A, D, S, P, C>
where
    A: AgentRepository,
    D: DeploymentRepository,
    S: VersionSequence,
    P: DistributionRepository,
    C: Clock + Send + Sync,
{
    /// Creates a processor advertising `capabilities` to every agent.
    #[must_use]
    pub const fn new(
        directory: AgentDirectoryService<A, C>,
        deployments: Arc<DeploymentService<D, A, S, C>>,
        distribution: Arc<DistributionService<P, C>>,
        capabilities: ServerCapabilities,
    ) -> Self {
        Self {
            directory,
            deployments,
            distribution,
            capabilities,
        }
    }

    /// Server capabilities advertised in every response.
    #[must_use]
    pub const fn capabilities(&self) -> ServerCapabilities {
        self.capabilities
    }

    async fn process(
        &self,
        session: &Session,
        decoded: DecodedMessage,
    ) -> ProcessingResult<ServerToAgent> {
        let DecodedMessage { message, tier } = decoded;
        let agent_id = session.agent_id;

        if let Err(rejection) = screen(&session.principal.instance_uid, &message) {
            self.directory.record_heartbeat(agent_id).await?;
            return Err(rejection);
        }

        let identity_only = matches!(tier, DecodeTier::IdentityOnly);
        let degraded = tier.is_degraded();
        let disconnecting = message.agent_disconnect.is_some();
        let offered = self.capabilities;
        let (agent, observation) = self
            .directory
            .modify(agent_id, |agent, clock| {
                agent.record_heartbeat(clock);
                let sequence = agent.observe_sequence(message.sequence_num);
                if let Some(description) = &message.agent_description {
                    agent.apply_description(&description_from_wire(description), clock);
                }
                let capabilities = (!identity_only).then(|| {
                    agent.update_capabilities(AgentCapabilities::decode(message.capabilities), clock)
                });
                if let Some(health) = &message.health {
                    agent.record_health(health_from_wire(health, clock.utc()), clock);
                }
                if let Some(state) = message
                    .remote_config_status
                    .as_ref()
                    .and_then(|status| remote_config_from_wire(status, clock.utc()))
                {
                    agent.record_remote_config(state, clock);
                }
                if let Some(config) = message
                    .effective_config
                    .as_ref()
                    .and_then(|config| effective_config_from_wire(config, clock.utc()))
                {
                    agent.record_effective_config(config, clock);
                }
                if degraded {
                    agent.request_full_state(clock);
                }
                agent.negotiate_server_capabilities(offered);
                if disconnecting {
                    agent.mark_disconnected(clock);
                }
                Observation {
                    sequence,
                    capabilities,
                }
            })
            .await?;
        log_observation(&agent, &observation, message.sequence_num);

        self.record_delivery_reports(&agent, &message).await?;

        if disconnecting {
            info!(agent_id = %agent.id(), instance_uid = %agent.instance_uid(), "agent announced disconnect");
            return Ok(self.base_response(&agent));
        }
        self.build_response(&agent).await
    }

    async fn record_delivery_reports(
        &self,
        agent: &Agent,
        message: &AgentToServer,
    ) -> ProcessingResult<()> {
        let applied = agent
            .remote_config()
            .filter(|_| message.remote_config_status.is_some())
            .and_then(|state| {
                let status = AuditStatus::from_reported(state.status)?;
                Some((status, state.hash?, state.error_message.clone()))
            });
        if let Some((status, hash, error_message)) = applied {
            self.deployments
                .record_agent_report(agent.id(), status, hash, error_message)
                .await?;
        }
        if let Some(statuses) = &message.package_statuses {
            self.distribution
                .record_package_statuses(agent.id(), packages_from_wire(statuses))
                .await?;
        }
        if let Some(report) = message
            .connection_settings_status
            .as_ref()
            .and_then(settings_from_wire)
        {
            self.distribution
                .record_settings_status(agent.id(), report)
                .await?;
        }
        Ok(())
    }

    fn base_response(&self, agent: &Agent) -> ServerToAgent {
        let mut response = ServerToAgent {
            instance_uid: agent.instance_uid().to_wire(),
            capabilities: self.capabilities.encode(),
            ..ServerToAgent::default()
        };
        if agent.needs_full_state() {
            response.flags |= flag_bit(ServerToAgentFlags::ReportFullState.into());
        }
        response
    }

    async fn build_response(&self, agent: &Agent) -> ProcessingResult<ServerToAgent> {
        let mut response = self.base_response(agent);
        let accepts = agent.agent_capabilities();

        if self.offers(ServerCapabilities::OFFERS_REMOTE_CONFIG)
            && accepts.contains(AgentCapabilities::ACCEPTS_REMOTE_CONFIG)
        {
            if let Some(delivery) = self.deployments.claim_delivery(agent).await? {
                info!(
                    agent_id = %agent.id(),
                    deployment_id = %delivery.deployment.id(),
                    version = %delivery.deployment.version(),
                    "remote config sent"
                );
                response.remote_config = Some(remote_config_to_wire(&delivery.deployment));
            }
        }
        if self.offers(ServerCapabilities::OFFERS_PACKAGES)
            && accepts.contains(AgentCapabilities::ACCEPTS_PACKAGES)
        {
            if let Some(delivery) = self.distribution.claim_packages(agent).await? {
                response.packages_available = Some(packages_to_wire(&delivery));
            }
        }
        if self.offers(ServerCapabilities::OFFERS_CONNECTION_SETTINGS)
            && accepts.contains(AgentCapabilities::ACCEPTS_OPAMP_CONNECTION_SETTINGS)
        {
            if let Some(offer) = self.distribution.claim_connection_settings(agent).await? {
                response.connection_settings = Some(settings_to_wire(&offer));
            }
        }
        Ok(response)
    }

    const fn offers(&self, capability: ServerCapabilities) -> bool {
        self.capabilities.contains(capability)
    }
}

#[async_trait]
impl<A, D, S, P, C> ProtocolHandler for MessageProcessor<A, D, S, P, C>
where
    A: AgentRepository,
    D: DeploymentRepository,
    S: VersionSequence,
    P: DistributionRepository,
    C: Clock + Send + Sync,
{
    async fn open_session(
        &self,
        principal: Principal,
        transport: TransportType,
    ) -> ProcessingResult<Session> {
        let Some(agent) = self
            .directory
            .resolve(principal.org_id, &principal.instance_uid)
            .await?
        else {
            warn!(org_id = %principal.org_id, instance_uid = %principal.instance_uid, "connection for unregistered agent refused");
            return Err(ProcessingError::UnknownAgent {
                org_id: principal.org_id,
                instance_uid: principal.instance_uid,
            });
        };

        let polling = transport == TransportType::HttpPoll
            && agent.transport() == Some(TransportType::HttpPoll)
            && agent.connection_status() == ConnectionStatus::Connected;
        if polling {
            self.directory.record_heartbeat(agent.id()).await?;
        } else {
            self.directory
                .modify(agent.id(), |stored, clock| stored.mark_connected(transport, clock))
                .await?;
            info!(
                agent_id = %agent.id(),
                instance_uid = %principal.instance_uid,
                %transport,
                "agent connected"
            );
        }
        Ok(Session {
            principal,
            agent_id: agent.id(),
            transport,
        })
    }

    async fn handle(
        &self,
        session: &Session,
        message: DecodedMessage,
    ) -> ProcessingResult<ServerToAgent> {
        self.process(session, message).await
    }

    async fn close_session(&self, session: &Session) -> ProcessingResult<()> {
        self.directory.mark_disconnected(session.agent_id).await?;
        info!(
            agent_id = %session.agent_id,
            instance_uid = %session.principal.instance_uid,
            "agent disconnected"
        );
        Ok(())
    }
}

/// Rejects messages that must not change state: a foreign identity, or a
/// request for a new identifier.
fn screen(bound: &InstanceUid, message: &AgentToServer) -> ProcessingResult<()> {
    if !message.instance_uid.is_empty() {
        let matches = InstanceUid::from_wire(&message.instance_uid)
            .is_ok_and(|reported| &reported == bound);
        if !matches {
            return Err(ProcessingError::IdentityMismatch {
                expected: bound.clone(),
                reported: String::from_utf8_lossy(&message.instance_uid).into_owned(),
            });
        }
    }
    if message.flags & flag_bit(AgentToServerFlags::RequestInstanceUid.into()) != 0 {
        return Err(ProcessingError::InstanceUidRequested);
    }
    Ok(())
}

fn log_observation(agent: &Agent, observation: &Observation, received: u64) {
    match observation.sequence {
        SequenceObservation::Stale { stored } => {
            debug!(agent_id = %agent.id(), stored, received, "non-monotonic sequence number ignored");
        }
        SequenceObservation::Gap { previous } => {
            debug!(agent_id = %agent.id(), previous, received, "sequence gap; full state requested");
        }
        SequenceObservation::Ignored | SequenceObservation::Advanced => {}
    }
    if let Some(CapabilityUpdate::Inferred(assumed)) = observation.capabilities {
        warn!(
            agent_id = %agent.id(),
            mode = %agent.deployment_mode(),
            capabilities = ?assumed.names(),
            inferred = true,
            "agent reported no capabilities; assumed the default for its deployment mode"
        );
    }
}

fn flag_bit(flag: i32) -> u64 {
    u64::from(flag.unsigned_abs())
}
