//! Agent aggregate root.

use super::{
    AgentDescription, AgentHealth, AgentId, AgentTag, ConnectionStatus, DeploymentMode,
    EffectiveConfig, InstanceUid, OrgId, RemoteConfigState, ReportedHealth, TransportType,
};
use crate::capability::{AgentCapabilities, ServerCapabilities};
use crate::pipeline::domain::ConfigHash;
use crate::rollout::domain::{ConfigVersion, DeploymentId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Configuration the control plane last directed at an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigTarget {
    /// Deployment the configuration belongs to.
    pub deployment_id: DeploymentId,
    /// Global version of that deployment.
    pub version: ConfigVersion,
    /// Hash of the configuration bytes.
    pub hash: ConfigHash,
}

/// Outcome of recording an inbound sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceObservation {
    /// Zero carries no ordering information and was ignored.
    Ignored,
    /// The next expected number was stored.
    Advanced,
    /// A later number than expected was stored; messages were skipped.
    Gap {
        /// The previously stored number.
        previous: u64,
    },
    /// A duplicate or older number arrived; the stored value is unchanged.
    Stale {
        /// The stored number, which was kept.
        stored: u64,
    },
}

/// How a capability report was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityUpdate {
    /// The reported bit-field was stored verbatim.
    Reported,
    /// The report was empty and the deployment-mode default was substituted.
    Inferred(AgentCapabilities),
}

/// Agent aggregate root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    id: AgentId,
    org_id: OrgId,
    instance_uid: InstanceUid,
    name: Option<String>,
    revision: u64,
    connection_status: ConnectionStatus,
    transport: Option<TransportType>,
    last_sequence_num: u64,
    registration_failed: bool,
    agent_capabilities: AgentCapabilities,
    server_capabilities: ServerCapabilities,
    capabilities_inferred: bool,
    deployment_mode: DeploymentMode,
    tags: BTreeSet<AgentTag>,
    config_target: Option<ConfigTarget>,
    remote_config: Option<RemoteConfigState>,
    effective_config: Option<EffectiveConfig>,
    full_state_requested: bool,
    reported_health: Option<ReportedHealth>,
    attributes: BTreeMap<String, String>,
    last_seen_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedAgentData {
    /// Persisted agent identifier.
    pub id: AgentId,
    /// Owning organisation.
    pub org_id: OrgId,
    /// Agent-chosen instance identifier.
    pub instance_uid: InstanceUid,
    /// Display name from `service.name`.
    pub name: Option<String>,
    /// Optimistic concurrency revision.
    pub revision: u64,
    /// Connection lifecycle status.
    pub connection_status: ConnectionStatus,
    /// Last transport used.
    pub transport: Option<TransportType>,
    /// Highest sequence number seen on the current connection.
    pub last_sequence_num: u64,
    /// Registration-failure marker.
    pub registration_failed: bool,
    /// Stored agent capability bit-field.
    pub agent_capabilities: AgentCapabilities,
    /// Server capabilities last offered to the agent.
    pub server_capabilities: ServerCapabilities,
    /// Whether `agent_capabilities` was inferred.
    pub capabilities_inferred: bool,
    /// Declared deployment mode.
    pub deployment_mode: DeploymentMode,
    /// Targeting tags.
    pub tags: BTreeSet<AgentTag>,
    /// Last directed configuration.
    pub config_target: Option<ConfigTarget>,
    /// Last remote-config status report.
    pub remote_config: Option<RemoteConfigState>,
    /// Last effective-config report.
    pub effective_config: Option<EffectiveConfig>,
    /// Whether a full state report is outstanding.
    pub full_state_requested: bool,
    /// Last component health report.
    pub reported_health: Option<ReportedHealth>,
    /// Flattened description attributes.
    pub attributes: BTreeMap<String, String>,
    /// Last contact time.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Creates a never-connected agent.
    #[must_use]
    pub fn new(org_id: OrgId, instance_uid: InstanceUid, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: AgentId::new(),
            org_id,
            instance_uid,
            name: None,
            revision: 0,
            connection_status: ConnectionStatus::NeverConnected,
            transport: None,
            last_sequence_num: 0,
            registration_failed: false,
            agent_capabilities: AgentCapabilities::empty(),
            server_capabilities: ServerCapabilities::empty(),
            capabilities_inferred: false,
            deployment_mode: DeploymentMode::Unknown,
            tags: BTreeSet::new(),
            config_target: None,
            remote_config: None,
            effective_config: None,
            full_state_requested: false,
            reported_health: None,
            attributes: BTreeMap::new(),
            last_seen_at: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs an agent from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedAgentData) -> Self {
        Self {
            id: data.id,
            org_id: data.org_id,
            instance_uid: data.instance_uid,
            name: data.name,
            revision: data.revision,
            connection_status: data.connection_status,
            transport: data.transport,
            last_sequence_num: data.last_sequence_num,
            registration_failed: data.registration_failed,
            agent_capabilities: data.agent_capabilities,
            server_capabilities: data.server_capabilities,
            capabilities_inferred: data.capabilities_inferred,
            deployment_mode: data.deployment_mode,
            tags: data.tags,
            config_target: data.config_target,
            remote_config: data.remote_config,
            effective_config: data.effective_config,
            full_state_requested: data.full_state_requested,
            reported_health: data.reported_health,
            attributes: data.attributes,
            last_seen_at: data.last_seen_at,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the agent identifier.
    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Returns the owning organisation.
    #[must_use]
    pub const fn org_id(&self) -> OrgId {
        self.org_id
    }

    /// Returns the instance identifier.
    #[must_use]
    pub const fn instance_uid(&self) -> &InstanceUid {
        &self.instance_uid
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the optimistic concurrency revision.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the connection status.
    #[must_use]
    pub const fn connection_status(&self) -> ConnectionStatus {
        self.connection_status
    }

    /// Returns the last transport used.
    #[must_use]
    pub const fn transport(&self) -> Option<TransportType> {
        self.transport
    }

    /// Returns the stored sequence number.
    #[must_use]
    pub const fn last_sequence_num(&self) -> u64 {
        self.last_sequence_num
    }

    /// Returns the registration-failure marker.
    #[must_use]
    pub const fn registration_failed(&self) -> bool {
        self.registration_failed
    }

    /// Returns the stored agent capabilities, unknown bits included.
    #[must_use]
    pub const fn agent_capabilities(&self) -> AgentCapabilities {
        self.agent_capabilities
    }

    /// Returns the server capabilities last offered.
    #[must_use]
    pub const fn server_capabilities(&self) -> ServerCapabilities {
        self.server_capabilities
    }

    /// Returns `true` when the stored agent capabilities were inferred.
    #[must_use]
    pub const fn capabilities_inferred(&self) -> bool {
        self.capabilities_inferred
    }

    /// Returns the declared deployment mode.
    #[must_use]
    pub const fn deployment_mode(&self) -> DeploymentMode {
        self.deployment_mode
    }

    /// Returns the targeting tags.
    #[must_use]
    pub const fn tags(&self) -> &BTreeSet<AgentTag> {
        &self.tags
    }

    /// Returns the last directed configuration.
    #[must_use]
    pub const fn config_target(&self) -> Option<ConfigTarget> {
        self.config_target
    }

    /// Returns the version of the last directed configuration.
    #[must_use]
    pub fn last_config_version(&self) -> Option<ConfigVersion> {
        self.config_target.map(|target| target.version)
    }

    /// Returns the hash of the last directed configuration.
    #[must_use]
    pub fn last_config_hash(&self) -> Option<ConfigHash> {
        self.config_target.map(|target| target.hash)
    }

    /// Returns the last remote-config status report.
    #[must_use]
    pub const fn remote_config(&self) -> Option<&RemoteConfigState> {
        self.remote_config.as_ref()
    }

    /// Returns the last effective-config report.
    #[must_use]
    pub const fn effective_config(&self) -> Option<&EffectiveConfig> {
        self.effective_config.as_ref()
    }

    /// Returns `true` while a full state report is outstanding.
    #[must_use]
    pub const fn full_state_requested(&self) -> bool {
        self.full_state_requested
    }

    /// Returns the last component health report.
    #[must_use]
    pub const fn reported_health(&self) -> Option<&ReportedHealth> {
        self.reported_health.as_ref()
    }

    /// Returns the flattened description attributes.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Returns the last contact time.
    #[must_use]
    pub const fn last_seen_at(&self) -> Option<DateTime<Utc>> {
        self.last_seen_at
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

    /// Derives liveness from the last contact time.
    #[must_use]
    pub fn health(&self, now: DateTime<Utc>) -> AgentHealth {
        AgentHealth::from_last_seen(self.last_seen_at, now)
    }

    /// Sets the display name.
    pub fn rename(&mut self, name: Option<String>, clock: &impl Clock) {
        self.name = name;
        self.touch(clock);
    }

    /// Records contact from the agent.
    pub fn record_heartbeat(&mut self, clock: &impl Clock) {
        let now = clock.utc();
        self.last_seen_at = Some(now);
        self.updated_at = now;
    }

    /// Records a sequence number without ever moving it backwards.
    ///
    /// A gap means messages were lost, so the agent is asked for its full
    /// state on the next response.
    pub fn observe_sequence(&mut self, sequence_num: u64) -> SequenceObservation {
        if sequence_num == 0 {
            return SequenceObservation::Ignored;
        }
        let previous = self.last_sequence_num;
        if sequence_num <= previous {
            return SequenceObservation::Stale { stored: previous };
        }
        self.last_sequence_num = sequence_num;
        if previous != 0 && sequence_num > previous.saturating_add(1) {
            self.full_state_requested = true;
            return SequenceObservation::Gap { previous };
        }
        SequenceObservation::Advanced
    }

    /// Stores a capability report.
    ///
    /// The raw bit-field is stored verbatim unless it is empty and the
    /// deployment mode supplies an assumed default, in which case the
    /// default is stored and flagged as inferred.
    pub fn update_capabilities(
        &mut self,
        reported: AgentCapabilities,
        clock: &impl Clock,
    ) -> CapabilityUpdate {
        let outcome = match self.deployment_mode.inferred_capabilities() {
            Some(assumed) if reported.is_empty() => {
                self.agent_capabilities = assumed;
                self.capabilities_inferred = true;
                CapabilityUpdate::Inferred(assumed)
            }
            _ => {
                self.agent_capabilities = reported;
                self.capabilities_inferred = false;
                CapabilityUpdate::Reported
            }
        };
        self.touch(clock);
        outcome
    }

    /// Records the server capabilities offered to the agent.
    pub fn negotiate_server_capabilities(&mut self, offered: ServerCapabilities) {
        self.server_capabilities = offered;
    }

    /// Applies an agent description.
    ///
    /// A description without `service.name` marks the registration failed;
    /// a later complete description clears the marker.
    pub fn apply_description(&mut self, description: &AgentDescription, clock: &impl Clock) {
        self.deployment_mode = description.deployment_mode();
        self.attributes = description
            .identifying
            .iter()
            .chain(&description.non_identifying)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if let Some(service_name) = description.service_name() {
            self.name = Some(service_name.to_owned());
            self.registration_failed = false;
            if self.connection_status == ConnectionStatus::Failed {
                self.connection_status = ConnectionStatus::Connected;
            }
        } else {
            self.registration_failed = true;
            self.connection_status = ConnectionStatus::Failed;
        }
        self.touch(clock);
    }

    /// Overrides the deployment mode, as done from enrollment files.
    pub fn set_deployment_mode(&mut self, mode: DeploymentMode, clock: &impl Clock) {
        self.deployment_mode = mode;
        self.touch(clock);
    }

    /// Points the agent at a configuration it should pull next.
    pub fn assign_config_target(&mut self, target: ConfigTarget, clock: &impl Clock) {
        self.config_target = Some(target);
        self.touch(clock);
    }

    /// Stores a remote-config status report.
    pub fn record_remote_config(&mut self, state: RemoteConfigState, clock: &impl Clock) {
        self.remote_config = Some(state);
        self.touch(clock);
    }

    /// Stores an effective-config report and satisfies any outstanding
    /// full state request.
    pub fn record_effective_config(&mut self, config: EffectiveConfig, clock: &impl Clock) {
        self.effective_config = Some(config);
        self.full_state_requested = false;
        self.touch(clock);
    }

    /// Asks the agent for its full state on the next response.
    pub fn request_full_state(&mut self, clock: &impl Clock) {
        self.full_state_requested = true;
        self.touch(clock);
    }

    /// Returns `true` when the next response should ask for full state.
    ///
    /// Only agents that can report an effective config are asked, and only
    /// when none is on file or a request is outstanding.
    #[must_use]
    pub fn needs_full_state(&self) -> bool {
        self.agent_capabilities
            .contains(AgentCapabilities::REPORTS_EFFECTIVE_CONFIG)
            && (self.effective_config.is_none() || self.full_state_requested)
    }

    /// Stores a component health report.
    pub fn record_health(&mut self, health: ReportedHealth, clock: &impl Clock) {
        self.reported_health = Some(health);
        self.touch(clock);
    }

    /// Adds a tag, returning `false` when it was already present.
    pub fn add_tag(&mut self, tag: AgentTag, clock: &impl Clock) -> bool {
        let inserted = self.tags.insert(tag);
        if inserted {
            self.touch(clock);
        }
        inserted
    }

    /// Removes a tag, returning `false` when it was absent.
    pub fn remove_tag(&mut self, tag: &AgentTag, clock: &impl Clock) -> bool {
        let removed = self.tags.remove(tag);
        if removed {
            self.touch(clock);
        }
        removed
    }

    /// Replaces every tag.
    pub fn replace_tags(&mut self, tags: BTreeSet<AgentTag>, clock: &impl Clock) {
        self.tags = tags;
        self.touch(clock);
    }

    /// Marks a new channel open.
    ///
    /// Sequence numbers are monotonic per connection, so the stored value
    /// restarts with each new channel.
    pub fn mark_connected(&mut self, transport: TransportType, clock: &impl Clock) {
        self.connection_status = if self.registration_failed {
            ConnectionStatus::Failed
        } else {
            ConnectionStatus::Connected
        };
        self.transport = Some(transport);
        self.last_sequence_num = 0;
        self.record_heartbeat(clock);
    }

    /// Marks the channel closed.
    pub fn mark_disconnected(&mut self, clock: &impl Clock) {
        self.connection_status = ConnectionStatus::Disconnected;
        self.touch(clock);
    }

    /// Moves the revision past a successful conditional write.
    pub(crate) const fn advance_revision(&mut self) {
        self.revision += 1;
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}
