//! Capabilities advertised by the server in `ServerToAgent.capabilities`.

use super::names::{self, CapabilityReport, UnknownCapabilityName};
use bitflags::bitflags;

bitflags! {
    /// Typed set of server capabilities.
    ///
    /// Bits outside the named constants are preserved verbatim.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ServerCapabilities: u64 {
        /// The server accepts agent status reports.
        const ACCEPTS_STATUS = 0x01;
        /// The server offers remote configuration.
        const OFFERS_REMOTE_CONFIG = 0x02;
        /// The server accepts effective configuration reports.
        const ACCEPTS_EFFECTIVE_CONFIG = 0x04;
        /// The server offers packages.
        const OFFERS_PACKAGES = 0x08;
        /// The server accepts package status reports.
        const ACCEPTS_PACKAGES_STATUS = 0x10;
        /// The server offers connection settings.
        const OFFERS_CONNECTION_SETTINGS = 0x20;
        /// The server accepts connection settings requests.
        const ACCEPTS_CONNECTION_SETTINGS_REQUEST = 0x40;

        const _ = !0;
    }
}

const NAME_TABLE: &[(u64, &str)] = &[
    (ServerCapabilities::ACCEPTS_STATUS.bits(), "AcceptsStatus"),
    (ServerCapabilities::OFFERS_REMOTE_CONFIG.bits(), "OffersRemoteConfig"),
    (ServerCapabilities::ACCEPTS_EFFECTIVE_CONFIG.bits(), "AcceptsEffectiveConfig"),
    (ServerCapabilities::OFFERS_PACKAGES.bits(), "OffersPackages"),
    (ServerCapabilities::ACCEPTS_PACKAGES_STATUS.bits(), "AcceptsPackagesStatus"),
    (ServerCapabilities::OFFERS_CONNECTION_SETTINGS.bits(), "OffersConnectionSettings"),
    (
        ServerCapabilities::ACCEPTS_CONNECTION_SETTINGS_REQUEST.bits(),
        "AcceptsConnectionSettingsRequest",
    ),
];

impl ServerCapabilities {
    /// The capabilities this control plane implements.
    ///
    /// Connection settings requests are excluded because they exist to
    /// negotiate client certificates.
    pub const SUPPORTED: Self = Self::ACCEPTS_STATUS
        .union(Self::OFFERS_REMOTE_CONFIG)
        .union(Self::ACCEPTS_EFFECTIVE_CONFIG)
        .union(Self::OFFERS_PACKAGES)
        .union(Self::ACCEPTS_PACKAGES_STATUS)
        .union(Self::OFFERS_CONNECTION_SETTINGS);

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
        Self::from_bits_retain(0x7F)
    }

    /// Returns the protocol names of the known capabilities in the set.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        names::names_of(self.bits(), NAME_TABLE)
    }

    /// Parses a set from protocol names such as `OffersRemoteConfig`.
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

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self::SUPPORTED
    }
}
