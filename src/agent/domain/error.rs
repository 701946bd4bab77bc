//! Error types for agent domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing agent domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentDomainError {
    /// The instance identifier is empty after trimming.
    #[error("agent instance identifier must not be empty")]
    EmptyInstanceUid,

    /// The tag is empty after trimming.
    #[error("agent tag must not be empty")]
    EmptyTag,

    /// The tag exceeds the 64-character storage limit.
    #[error("agent tag exceeds 64 character limit: {0}")]
    TagTooLong(String),

    /// The tag contains characters outside `[a-z0-9_.:/-]`.
    #[error(
        "agent tag '{0}' contains invalid characters (only lowercase alphanumerics and _ . : / - allowed)"
    )]
    InvalidTag(String),
}

/// A persisted enumeration value is not recognised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {field}: {value}")]
pub struct ParseAgentValueError {
    /// Which enumeration was being parsed.
    pub field: &'static str,
    /// The rejected text.
    pub value: String,
}

impl ParseAgentValueError {
    pub(super) fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_owned(),
        }
    }
}
