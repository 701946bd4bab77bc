//! Process-local version sequence.

use crate::rollout::{
    domain::ConfigVersion,
    ports::{DeploymentRepositoryResult, VersionSequence},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter issuing versions within one process.
///
/// Clones share the counter. It is not a valid authority for several
/// processes writing to one store; use the `PostgreSQL` sequence there.
#[derive(Debug, Clone, Default)]
pub struct AtomicVersionSequence {
    last: Arc<AtomicU64>,
}

impl AtomicVersionSequence {
    /// Creates a sequence whose first version is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sequence continuing after `last`.
    #[must_use]
    pub fn starting_after(last: ConfigVersion) -> Self {
        Self {
            last: Arc::new(AtomicU64::new(last.value())),
        }
    }
}

#[async_trait]
impl VersionSequence for AtomicVersionSequence {
    async fn next_version(&self) -> DeploymentRepositoryResult<ConfigVersion> {
        let previous = self.last.fetch_add(1, Ordering::SeqCst);
        Ok(ConfigVersion::new(previous.wrapping_add(1)))
    }
}
