//! Capabilities advertised by an agent in `AgentToServer.capabilities`.

use super::names::{self, CapabilityReport, UnknownCapabilityName};
use bitflags::bitflags;

bitflags! {
    /// Typed set of agent capabilities.
    ///
    /// Bits outside the named constants are preserved verbatim.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct AgentCapabilities: u64 {
        /// The agent reports its status.
        const REPORTS_STATUS = 0x0000_0001;
        /// The agent accepts remote configuration from the server.
        const ACCEPTS_REMOTE_CONFIG = 0x0000_0002;
        /// The agent reports the configuration it is actually running.
        const REPORTS_EFFECTIVE_CONFIG = 0x0000_0004;
        /// The agent accepts package offers.
        const ACCEPTS_PACKAGES = 0x0000_0008;
        /// The agent reports package installation statuses.
        const REPORTS_PACKAGE_STATUSES = 0x0000_0010;
        /// The agent can report its own traces.
        const REPORTS_OWN_TRACES = 0x0000_0020;
        /// The agent can report its own metrics.
        const REPORTS_OWN_METRICS = 0x0000_0040;
        /// The agent can report its own logs.
        const REPORTS_OWN_LOGS = 0x0000_0080;
        /// The agent accepts OpAMP connection settings.
        const ACCEPTS_OPAMP_CONNECTION_SETTINGS = 0x0000_0100;
        /// The agent accepts connection settings for other destinations.
        const ACCEPTS_OTHER_CONNECTION_SETTINGS = 0x0000_0200;
        /// The agent accepts restart commands.
        const ACCEPTS_RESTART_COMMAND = 0x0000_0400;
        /// The agent reports component health.
        const REPORTS_HEALTH = 0x0000_0800;
        /// The agent reports the status of remote configuration.
        const REPORTS_REMOTE_CONFIG = 0x0000_1000;
        /// The agent sends heartbeats.
        const REPORTS_HEARTBEAT = 0x0000_2000;
        /// The agent reports available components.
        const REPORTS_AVAILABLE_COMPONENTS = 0x0000_4000;
        /// The agent reports the status of offered connection settings.
        const REPORTS_CONNECTION_SETTINGS_STATUS = 0x0000_8000;

        const _ = !0;
    }
}

const NAME_TABLE: &[(u64, &str)] = &[
    (AgentCapabilities::REPORTS_STATUS.bits(), "ReportsStatus"),
    (AgentCapabilities::ACCEPTS_REMOTE_CONFIG.bits(), "AcceptsRemoteConfig"),
    (AgentCapabilities::REPORTS_EFFECTIVE_CONFIG.bits(), "ReportsEffectiveConfig"),
    (AgentCapabilities::ACCEPTS_PACKAGES.bits(), "AcceptsPackages"),
    (AgentCapabilities::REPORTS_PACKAGE_STATUSES.bits(), "ReportsPackageStatuses"),
    (AgentCapabilities::REPORTS_OWN_TRACES.bits(), "ReportsOwnTraces"),
    (AgentCapabilities::REPORTS_OWN_METRICS.bits(), "ReportsOwnMetrics"),
    (AgentCapabilities::REPORTS_OWN_LOGS.bits(), "ReportsOwnLogs"),
    (AgentCapabilities::ACCEPTS_OPAMP_CONNECTION_SETTINGS.bits(), "AcceptsOpAMPConnectionSettings"),
    (AgentCapabilities::ACCEPTS_OTHER_CONNECTION_SETTINGS.bits(), "AcceptsOtherConnectionSettings"),
    (AgentCapabilities::ACCEPTS_RESTART_COMMAND.bits(), "AcceptsRestartCommand"),
    (AgentCapabilities::REPORTS_HEALTH.bits(), "ReportsHealth"),
    (AgentCapabilities::REPORTS_REMOTE_CONFIG.bits(), "ReportsRemoteConfig"),
    (AgentCapabilities::REPORTS_HEARTBEAT.bits(), "ReportsHeartbeat"),
    (AgentCapabilities::REPORTS_AVAILABLE_COMPONENTS.bits(), "ReportsAvailableComponents"),
    (
        AgentCapabilities::REPORTS_CONNECTION_SETTINGS_STATUS.bits(),
        "ReportsConnectionSettingsStatus",
    ),
];

impl AgentCapabilities {
    /// Encodes the set as the raw wire integer, unknown bits included.
    #[must_use]
    pub const fn encode(self) -> u64 {
        self.bits()
    }

    /// Decodes a raw wire integer without discarding unknown bits.
    #[must_use]
    pub const fn decode(raw: u64) -> Self {
        Self::from_bits_retain(raw)
    }

    /// Returns the bits not covered by the current name table.
    #[must_use]
    pub const fn unknown_bits(self) -> u64 {
        self.bits() & !Self::all_named().bits()
    }

    /// Returns the union of every named capability.
    #[must_use]
    pub const fn all_named() -> Self {
        Self::from_bits_retain(0xFFFF)
    }

    /// Returns the protocol names of the known capabilities in the set.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        names::names_of(self.bits(), NAME_TABLE)
    }

    /// Parses a set from protocol names such as `AcceptsRemoteConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownCapabilityName`] for a name missing from the table.
    pub fn from_names<'a>(
        values: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, UnknownCapabilityName> {
        names::parse_names(values, NAME_TABLE).map(Self::from_bits_retain)
    }

    /// Summarises the set for display and logging.
    #[must_use]
    pub fn report(self) -> CapabilityReport {
        CapabilityReport::new(self.encode(), self.names(), self.unknown_bits())
    }
}
