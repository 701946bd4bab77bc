//! Port contracts for agent persistence.

mod repository;

pub use repository::{AgentRepository, AgentRepositoryError, AgentRepositoryResult};

#[cfg(test)]
pub use repository::MockAgentRepository;
