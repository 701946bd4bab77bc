//! Normalised targeting labels.

use super::AgentDomainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

const MAX_TAG_LEN: usize = 64;

/// Targeting label attached to an agent.
///
/// Tags are trimmed and lowercased on construction, so `" Prod "` and
/// `"prod"` are the same tag.
///
/// # Examples
///
/// ```
/// use fleetplane::agent::domain::AgentTag;
///
/// let tag = AgentTag::new(" Region:EU-West ").expect("valid tag");
/// assert_eq!(tag.as_str(), "region:eu-west");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentTag(String);

impl AgentTag {
    /// Normalises and validates a tag.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDomainError`] when the tag is empty, longer than 64
    /// characters, or contains characters outside `[a-z0-9_.:/-]`.
    pub fn new(value: impl AsRef<str>) -> Result<Self, AgentDomainError> {
        let normalized = value.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            return Err(AgentDomainError::EmptyTag);
        }
        if normalized.chars().count() > MAX_TAG_LEN {
            return Err(AgentDomainError::TagTooLong(normalized));
        }
        let allowed = |ch: char| {
            ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '_' | '.' | ':' | '/' | '-')
        };
        if !normalized.chars().all(allowed) {
            return Err(AgentDomainError::InvalidTag(normalized));
        }
        Ok(Self(normalized))
    }

    /// Returns the normalised tag text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AgentTag {
    type Error = AgentDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AgentTag> for String {
    fn from(tag: AgentTag) -> Self {
        tag.0
    }
}

impl fmt::Display for AgentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a set of tags is matched against an agent's tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMatch {
    /// The agent carries at least one of the tags.
    #[default]
    Any,
    /// The agent carries every tag.
    All,
}

impl TagMatch {
    /// Returns `true` when `carried` satisfies `wanted` under this mode.
    ///
    /// An empty `wanted` set matches every agent.
    #[must_use]
    pub fn matches(self, wanted: &[AgentTag], carried: &BTreeSet<AgentTag>) -> bool {
        if wanted.is_empty() {
            return true;
        }
        match self {
            Self::Any => wanted.iter().any(|tag| carried.contains(tag)),
            Self::All => wanted.iter().all(|tag| carried.contains(tag)),
        }
    }

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::All => "all",
        }
    }
}

impl TryFrom<&str> for TagMatch {
    type Error = super::ParseAgentValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            _ => Err(super::ParseAgentValueError::new("tag match mode", value)),
        }
    }
}
