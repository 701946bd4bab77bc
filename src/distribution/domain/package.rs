//! Package offers and per-agent install records.

use super::{Delivery, DistributionDomainError, LedgerStatus, ParseDistributionValueError};
use crate::agent::domain::{AgentId, OrgId};
use crate::pipeline::domain::ConfigHash;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_PACKAGE_NAME_LEN: usize = 128;

/// Install state of a package on one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    /// Not offered, or not present on the agent.
    Uninstalled,
    /// Offered; the agent is downloading or installing it.
    Installing,
    /// Installed at the offered hash.
    Installed,
    /// The agent could not install it.
    Failed,
}

impl LedgerStatus for PackageStatus {
    const IDLE: Self = Self::Uninstalled;
    const IN_FLIGHT: Self = Self::Installing;
    const DONE: Self = Self::Installed;
    const FAILED: Self = Self::Failed;
}

impl PackageStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninstalled => "uninstalled",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PackageStatus {
    type Error = ParseDistributionValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "uninstalled" => Ok(Self::Uninstalled),
            "installing" => Ok(Self::Installing),
            "installed" => Ok(Self::Installed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseDistributionValueError::new("package status", value)),
        }
    }
}

/// Whether a package replaces the agent binary or extends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    /// The agent executable itself.
    TopLevel,
    /// An add-on such as a plugin or extension bundle.
    #[default]
    Addon,
}

/// Name under which a package is offered and reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    /// Trims and validates a package name.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionDomainError`] for blank or overlong names.
    pub fn new(value: impl AsRef<str>) -> Result<Self, DistributionDomainError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DistributionDomainError::EmptyPackageName);
        }
        if trimmed.chars().count() > MAX_PACKAGE_NAME_LEN {
            return Err(DistributionDomainError::PackageNameTooLong {
                name: trimmed.to_owned(),
                max: MAX_PACKAGE_NAME_LEN,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the name text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PackageName {
    type Error = DistributionDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PackageName> for String {
    fn from(name: PackageName) -> Self {
        name.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A package published to every agent of an organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageOffer {
    org_id: OrgId,
    name: PackageName,
    version: String,
    download_url: String,
    hash: ConfigHash,
    kind: PackageKind,
    published_at: DateTime<Utc>,
}

impl PackageOffer {
    /// Creates an offer.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionDomainError::MissingDownloadUrl`] when the URL
    /// is blank.
    pub fn new(
        org_id: OrgId,
        name: PackageName,
        version: impl Into<String>,
        download_url: impl Into<String>,
        hash: ConfigHash,
        kind: PackageKind,
        clock: &impl Clock,
    ) -> Result<Self, DistributionDomainError> {
        let url = download_url.into();
        if url.trim().is_empty() {
            return Err(DistributionDomainError::MissingDownloadUrl(
                name.as_str().to_owned(),
            ));
        }
        Ok(Self {
            org_id,
            name,
            version: version.into(),
            download_url: url,
            hash,
            kind,
            published_at: clock.utc(),
        })
    }

    /// Owning organisation.
    #[must_use]
    pub const fn org_id(&self) -> OrgId {
        self.org_id
    }

    /// Package name.
    #[must_use]
    pub const fn name(&self) -> &PackageName {
        &self.name
    }

    /// Publisher-supplied version label.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Where agents fetch the package from.
    #[must_use]
    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    /// Digest of the package file; also identifies the offer.
    #[must_use]
    pub const fn hash(&self) -> ConfigHash {
        self.hash
    }

    /// Package kind.
    #[must_use]
    pub const fn kind(&self) -> PackageKind {
        self.kind
    }

    /// Publication time.
    #[must_use]
    pub const fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }
}

/// One package's status as reported by an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedPackage {
    /// Package name as the agent knows it.
    pub name: String,
    /// Mapped install state.
    pub status: PackageStatus,
    /// Hash of the offer the agent is acting on, when given.
    pub hash: Option<ConfigHash>,
    /// Agent-supplied failure detail.
    pub error_message: Option<String>,
}

/// Install record for one (agent, package) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    agent_id: AgentId,
    package: PackageName,
    delivery: Delivery<PackageStatus>,
}

impl PackageRecord {
    /// Creates an uninstalled record.
    #[must_use]
    pub fn new(agent_id: AgentId, package: PackageName, clock: &impl Clock) -> Self {
        Self {
            agent_id,
            package,
            delivery: Delivery::idle(clock),
        }
    }

    /// Reconstructs a record from storage.
    #[must_use]
    pub const fn from_parts(
        agent_id: AgentId,
        package: PackageName,
        delivery: Delivery<PackageStatus>,
    ) -> Self {
        Self {
            agent_id,
            package,
            delivery,
        }
    }

    /// Agent the record belongs to.
    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Package the record tracks.
    #[must_use]
    pub const fn package(&self) -> &PackageName {
        &self.package
    }

    /// Install state.
    #[must_use]
    pub const fn status(&self) -> PackageStatus {
        self.delivery.status()
    }

    /// Delivery details.
    #[must_use]
    pub const fn delivery(&self) -> &Delivery<PackageStatus> {
        &self.delivery
    }

    /// Mutable delivery details.
    pub const fn delivery_mut(&mut self) -> &mut Delivery<PackageStatus> {
        &mut self.delivery
    }
}
