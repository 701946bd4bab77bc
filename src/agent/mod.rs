//! Agent directory: the per-organisation registry of connected collectors.
//!
//! Every protocol exchange reads and writes the [`domain::Agent`] aggregate
//! kept here: connection status, negotiated capabilities, sequence
//! bookkeeping, tags, the directed configuration target, and the most recent
//! self-reports. The module follows hexagonal architecture:
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
