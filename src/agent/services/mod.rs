//! Service layer for the agent directory.

mod directory;

pub use directory::{
    AgentDirectoryError, AgentDirectoryResult, AgentDirectoryService, MAX_WRITE_ATTEMPTS,
    RegisterAgentRequest,
};
