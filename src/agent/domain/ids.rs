//! Identifier newtypes for agents and organisations.

use super::AgentDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Surrogate identifier for an agent row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(Uuid);

impl AgentId {
    /// Creates a new random agent identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an agent identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the organisation that owns an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(Uuid);

impl OrgId {
    /// Creates a new random organisation identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an organisation identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for OrgId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable, agent-chosen instance identifier, unique within an organisation.
///
/// OpAMP agents usually send a 16-byte UUID; those are kept in hyphenated
/// text form so that the same agent resolves identically whether its
/// identifier arrived as bytes or from an enrollment file.
///
/// # Examples
///
/// ```
/// use fleetplane::agent::domain::InstanceUid;
///
/// let uid = InstanceUid::new(" collector-7 ").expect("valid uid");
/// assert_eq!(uid.as_str(), "collector-7");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceUid(String);

impl InstanceUid {
    /// Validates and wraps an instance identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDomainError::EmptyInstanceUid`] when the value is blank.
    pub fn new(value: impl AsRef<str>) -> Result<Self, AgentDomainError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AgentDomainError::EmptyInstanceUid);
        }
        let canonical = Uuid::parse_str(trimmed)
            .map_or_else(|_| trimmed.to_owned(), |uuid| uuid.hyphenated().to_string());
        Ok(Self(canonical))
    }

    /// Interprets the `instance_uid` bytes of a protocol message.
    ///
    /// Printable ASCII is taken as text, other 16-byte values as a binary
    /// UUID, and anything else is rendered as hex.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDomainError::EmptyInstanceUid`] for an empty field.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, AgentDomainError> {
        if bytes.iter().all(u8::is_ascii_graphic) {
            return Self::new(String::from_utf8_lossy(bytes));
        }
        if let Ok(uuid) = Uuid::from_slice(bytes) {
            return Ok(Self(uuid.hyphenated().to_string()));
        }
        let mut hex = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            hex.push_str(&format!("{byte:02x}"));
        }
        Ok(Self(hex))
    }

    /// Encodes the identifier for an outbound protocol message.
    #[must_use]
    pub fn to_wire(&self) -> Vec<u8> {
        Uuid::parse_str(&self.0).map_or_else(
            |_| self.0.as_bytes().to_vec(),
            |uuid| uuid.as_bytes().to_vec(),
        )
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InstanceUid {
    type Error = AgentDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InstanceUid> for String {
    fn from(uid: InstanceUid) -> Self {
        uid.0
    }
}

impl fmt::Display for InstanceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
