//! `PostgreSQL` adapters for agent directory persistence.

mod models;
mod repository;
mod schema;

pub use repository::{AgentPgPool, PostgresAgentRepository};

#[cfg(test)]
pub(crate) use repository::{agent_to_row, row_to_agent};
