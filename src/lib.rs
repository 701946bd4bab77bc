//! Fleetplane: an OpAMP control plane for telemetry-collector fleets.
//!
//! Agents hold a persistent connection and exchange OpAMP messages with
//! the server. Each message updates the agent's directory record and
//! settles any outstanding configuration, package, or connection-settings
//! delivery; the reply carries whatever the agent should receive next.
//! Operators create versioned configuration deployments that roll out
//! immediately or through canary stages and can be rolled back.
//!
//! # Architecture
//!
//! Fleetplane follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (database, in-memory)
//!
//! # Modules
//!
//! - [`capability`]: Agent and server capability bit-fields
//! - [`pipeline`]: Collector configuration hashing and validation
//! - [`agent`]: Agent directory, tags, and health
//! - [`rollout`]: Versioned deployments, canary selection, and rollback
//! - [`distribution`]: Package and connection-settings offers
//! - [`opamp`]: Wire messages, decoding, and the message processor
//! - [`transport`]: Authenticated WebSocket and HTTP channels
//! - [`config`]: Runtime settings and agent enrollment
//! - [`app`]: Service wiring

pub mod agent;
pub mod app;
pub mod capability;
pub mod config;
pub mod distribution;
pub mod opamp;
pub mod pipeline;
pub mod rollout;
pub mod transport;
