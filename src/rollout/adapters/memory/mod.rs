//! In-memory adapters for deployment persistence and version issuance.

mod repository;
mod sequence;

pub use repository::InMemoryDeploymentRepository;
pub use sequence::AtomicVersionSequence;
