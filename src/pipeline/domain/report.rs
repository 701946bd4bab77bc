//! Validation outcome: fatal issues, advisory warnings, and the content hash.

use super::ConfigHash;
use std::fmt;
use thiserror::Error;

/// Component list referenced from a pipeline definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// `receivers`
    Receivers,
    /// `processors`
    Processors,
    /// `exporters`
    Exporters,
}

impl ComponentKind {
    /// Every component kind in pipeline order.
    pub const ALL: [Self; 3] = [Self::Receivers, Self::Processors, Self::Exporters];

    /// Returns the key used both in a pipeline and at the top level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Receivers => "receivers",
            Self::Processors => "processors",
            Self::Exporters => "exporters",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem that makes a configuration unacceptable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationIssue {
    /// The document is not valid YAML.
    #[error("configuration could not be parsed: {reason}")]
    Unparseable {
        /// Parser diagnostic.
        reason: String,
    },

    /// The document root is empty or not a mapping.
    #[error("configuration root must be a mapping")]
    RootNotMapping,

    /// A required top-level section is absent.
    #[error("missing required section '{section}'")]
    MissingSection {
        /// Section name.
        section: &'static str,
    },

    /// A top-level section is present but is not a mapping.
    #[error("section '{section}' must be a mapping")]
    SectionNotMapping {
        /// Section name.
        section: &'static str,
    },

    /// `service.pipelines` is absent, not a mapping, or empty.
    #[error("service.pipelines must be a non-empty mapping")]
    MissingPipelines,

    /// A pipeline definition is not a mapping.
    #[error("pipeline '{pipeline}' must be a mapping")]
    PipelineNotMapping {
        /// Pipeline name.
        pipeline: String,
    },

    /// A pipeline omits one of its component lists.
    #[error("pipeline '{pipeline}' is missing '{field}'")]
    MissingPipelineField {
        /// Pipeline name.
        pipeline: String,
        /// The absent list.
        field: ComponentKind,
    },

    /// A pipeline component list is not a sequence.
    #[error("pipeline '{pipeline}' field '{field}' must be a list")]
    PipelineFieldNotList {
        /// Pipeline name.
        pipeline: String,
        /// The malformed list.
        field: ComponentKind,
    },

    /// A pipeline references a component that is not defined.
    #[error("pipeline '{pipeline}' field '{field}' references undefined component '{component}'")]
    UndefinedComponent {
        /// Pipeline name.
        pipeline: String,
        /// The list containing the reference.
        field: ComponentKind,
        /// The dangling component name.
        component: String,
    },

    /// `service.extensions` is present but is not a sequence.
    #[error("service.extensions must be a list")]
    ExtensionsNotList,

    /// `service.extensions` references an extension that is not defined.
    #[error("service.extensions references undefined extension '{extension}'")]
    UndefinedExtension {
        /// The dangling extension name.
        extension: String,
    },
}

/// An observation that does not block deployment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationWarning {
    /// A pipeline component list is present but empty.
    #[error("pipeline '{pipeline}' has an empty '{field}' list")]
    EmptyPipelineField {
        /// Pipeline name.
        pipeline: String,
        /// The empty list.
        field: ComponentKind,
    },

    /// No receivers are defined anywhere in the document.
    #[error("configuration defines no receivers")]
    NoReceivers,

    /// No exporters are defined anywhere in the document.
    #[error("configuration defines no exporters")]
    NoExporters,

    /// The pipeline name does not start with a known signal type.
    #[error("pipeline '{pipeline}' does not name a known signal (traces, metrics, logs)")]
    UnknownSignal {
        /// Pipeline name.
        pipeline: String,
    },
}

/// Result of validating one configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationWarning>,
    hash: ConfigHash,
}

impl ValidationReport {
    /// Assembles a report from collected findings.
    #[must_use]
    pub const fn new(
        errors: Vec<ValidationIssue>,
        warnings: Vec<ValidationWarning>,
        hash: ConfigHash,
    ) -> Self {
        Self {
            errors,
            warnings,
            hash,
        }
    }

    /// Returns `true` when no fatal issue was found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the fatal issues.
    #[must_use]
    pub fn errors(&self) -> &[ValidationIssue] {
        &self.errors
    }

    /// Returns the advisory warnings.
    #[must_use]
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// Returns the hash of the validated bytes.
    #[must_use]
    pub const fn hash(&self) -> ConfigHash {
        self.hash
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "valid ({} warnings)", self.warnings.len());
        }
        let joined = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{} error(s): {joined}", self.errors.len())
    }
}
