//! Port contracts for distribution persistence.

mod repository;

pub use repository::{
    DistributionRepository, DistributionRepositoryError, DistributionRepositoryResult,
};
