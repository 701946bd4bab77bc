//! Versioned name tables shared by both capability spaces.

use serde::Serialize;
use thiserror::Error;

/// Revision of the capability name tables.
///
/// Bumped whenever a named bit is added to either table so that persisted
/// reports can be compared against the table that produced them.
pub const CAPABILITY_TABLE_VERSION: u16 = 1;

/// Human-readable breakdown of a capability bit-field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityReport {
    raw: u64,
    known: Vec<&'static str>,
    unknown_bits: u64,
    table_version: u16,
}

impl CapabilityReport {
    pub(super) const fn new(raw: u64, known: Vec<&'static str>, unknown_bits: u64) -> Self {
        Self {
            raw,
            known,
            unknown_bits,
            table_version: CAPABILITY_TABLE_VERSION,
        }
    }

    /// Returns the raw bit-field.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.raw
    }

    /// Returns the names of the recognised bits.
    #[must_use]
    pub fn known(&self) -> &[&'static str] {
        &self.known
    }

    /// Returns the bits the name table does not recognise.
    #[must_use]
    pub const fn unknown_bits(&self) -> u64 {
        self.unknown_bits
    }

    /// Returns the name-table revision used to build the report.
    #[must_use]
    pub const fn table_version(&self) -> u16 {
        self.table_version
    }
}

/// A capability name is absent from the name table.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown capability name: {0}")]
pub struct UnknownCapabilityName(pub String);

pub(super) fn names_of(raw: u64, table: &[(u64, &'static str)]) -> Vec<&'static str> {
    table
        .iter()
        .filter(|(bit, _)| raw & bit == *bit)
        .map(|(_, name)| *name)
        .collect()
}

pub(super) fn parse_names<'a>(
    values: impl IntoIterator<Item = &'a str>,
    table: &[(u64, &'static str)],
) -> Result<u64, UnknownCapabilityName> {
    let mut raw = 0_u64;
    for value in values {
        let trimmed = value.trim();
        let bit = table
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(trimmed))
            .map(|(bit, _)| *bit)
            .ok_or_else(|| UnknownCapabilityName(trimmed.to_owned()))?;
        raw |= bit;
    }
    Ok(raw)
}
