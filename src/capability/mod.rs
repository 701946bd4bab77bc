//! OpAMP capability bit-fields for agents and servers.
//!
//! Agent and server capabilities are independent 64-bit enumerations. Both
//! are modelled as typed flag-sets that retain unknown bits, so a value
//! decoded from the wire re-encodes to the same integer even when the agent
//! speaks a newer protocol revision than this server knows about.

mod agent;
mod names;
mod server;

pub use agent::AgentCapabilities;
pub use names::{CAPABILITY_TABLE_VERSION, CapabilityReport, UnknownCapabilityName};
pub use server::ServerCapabilities;

#[cfg(test)]
mod tests;
