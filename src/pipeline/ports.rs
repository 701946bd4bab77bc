//! Validator port.

use super::domain::ValidationReport;

/// Checks a collector configuration before it is deployed.
///
/// Validation never fails as an operation: problems are reported in the
/// returned [`ValidationReport`], which always carries the content hash.
pub trait ConfigValidator: Send + Sync {
    /// Validates `content` and hashes its exact bytes.
    fn validate(&self, content: &str) -> ValidationReport;
}
