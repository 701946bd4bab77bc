//! `PostgreSQL` sequence-backed version authority.

use super::models::NextVersionRow;
use super::repository::DeploymentPgPool;
use crate::rollout::{
    domain::ConfigVersion,
    ports::{DeploymentRepositoryError, DeploymentRepositoryResult, VersionSequence},
};
use async_trait::async_trait;
use diesel::prelude::*;

/// Issues versions from `config_version_seq`.
///
/// `nextval` is atomic and never rolls back, so versions stay unique across
/// every process sharing the database; gaps are possible and harmless.
#[derive(Debug, Clone)]
pub struct PostgresVersionSequence {
    pool: DeploymentPgPool,
}

impl PostgresVersionSequence {
    /// Creates a sequence reader from a connection pool.
    #[must_use]
    pub const fn new(pool: DeploymentPgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionSequence for PostgresVersionSequence {
    async fn next_version(&self) -> DeploymentRepositoryResult<ConfigVersion> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(DeploymentRepositoryError::persistence)?;
            let row = diesel::sql_query("SELECT nextval('config_version_seq') AS version")
                .get_result::<NextVersionRow>(&mut connection)
                .map_err(DeploymentRepositoryError::persistence)?;
            u64::try_from(row.version)
                .map(ConfigVersion::new)
                .map_err(DeploymentRepositoryError::persistence)
        })
        .await
        .map_err(DeploymentRepositoryError::persistence)?
    }
}
