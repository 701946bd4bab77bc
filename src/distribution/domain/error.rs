//! Errors raised by distribution domain types.

use thiserror::Error;

/// Validation failures for offers and package names.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DistributionDomainError {
    /// Package names must contain non-whitespace characters.
    #[error("package name must not be empty")]
    EmptyPackageName,

    /// Package names are limited in length.
    #[error("package name exceeds {max} characters: {name}")]
    PackageNameTooLong {
        /// The rejected name.
        name: String,
        /// Maximum permitted length.
        max: usize,
    },

    /// A package offer needs somewhere to download from.
    #[error("package {0} has no download URL")]
    MissingDownloadUrl(String),

    /// Heartbeat intervals must be positive.
    #[error("heartbeat interval must be at least one second")]
    InvalidHeartbeatInterval,
}

/// A persisted or reported value does not name a known variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {field}: {value}")]
pub struct ParseDistributionValueError {
    /// Which kind of value failed to parse.
    pub field: &'static str,
    /// The rejected text.
    pub value: String,
}

impl ParseDistributionValueError {
    pub(crate) fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}
