//! Value types produced by configuration validation.

mod hash;
mod report;

pub use hash::{ConfigHash, ParseConfigHashError};
pub use report::{ComponentKind, ValidationIssue, ValidationReport, ValidationWarning};
