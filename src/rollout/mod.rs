//! Configuration rollout: versioned deployments, per-agent delivery
//! ledger, target selection, and rollback.
//!
//! Deployments are created through [`services::DeploymentService`], which
//! validates the configuration, takes a version from the shared
//! [`ports::VersionSequence`], and fans out one audit row per targeted
//! agent. Delivery is pull-based: the protocol processor asks for the
//! newest pending row the next time an agent exchanges a message.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
