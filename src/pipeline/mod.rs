//! Collector pipeline configuration validation and content hashing.
//!
//! Deployments carry a declarative collector configuration. Before any
//! version is assigned the document is checked for the required sections,
//! well-formed pipelines, and dangling component references, and its exact
//! bytes are hashed so that the hash agents report back can be matched
//! byte-for-byte.
//!
//! - Domain types in [`domain`]
//! - Port contract in [`ports`]
//! - Default rule set in [`validation`]

pub mod domain;
pub mod ports;
pub mod validation;

#[cfg(test)]
mod tests;
