//! Global configuration version authority.

use super::DeploymentRepositoryResult;
use crate::rollout::domain::ConfigVersion;
use async_trait::async_trait;

/// Issues configuration versions.
///
/// Implementations must hand out each value exactly once and in strictly
/// increasing order across every concurrent caller that shares the
/// sequence, including callers in other processes when deployed that way.
#[async_trait]
pub trait VersionSequence: Send + Sync {
    /// Reserves the next version.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the sequence cannot be advanced.
    async fn next_version(&self) -> DeploymentRepositoryResult<ConfigVersion>;
}
