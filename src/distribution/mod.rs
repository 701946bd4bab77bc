//! Package and connection-settings distribution.
//!
//! Both ledgers mirror the configuration audit: an offer is published per
//! organisation, each agent gets one record per offered item, the record is
//! moved to its in-flight state when the offer is sent, and the agent's own
//! status reports settle it.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
