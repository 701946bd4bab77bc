//! Port contracts for deployment persistence and version issuance.

mod repository;
mod sequence;

pub use repository::{DeploymentRepository, DeploymentRepositoryError, DeploymentRepositoryResult};
pub use sequence::VersionSequence;
