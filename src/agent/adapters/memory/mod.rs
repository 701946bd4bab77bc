//! In-memory adapter for agent persistence.

mod agent;

pub use agent::InMemoryAgentRepository;
