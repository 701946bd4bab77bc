//! `PostgreSQL` adapters for deployment persistence and version issuance.

mod models;
mod repository;
mod schema;
mod sequence;

pub use repository::{DeploymentPgPool, PostgresDeploymentRepository};
pub use sequence::PostgresVersionSequence;

#[cfg(test)]
pub(crate) use repository::{audit_to_row, deployment_to_row, row_to_audit, row_to_deployment};
