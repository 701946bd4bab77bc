//! Composite validator applying every rule in order.

use super::rules::{self, Components, Findings, REQUIRED_SECTIONS};
use crate::pipeline::{
    domain::{ConfigHash, ValidationReport},
    ports::ConfigValidator,
};

/// Validator for collector pipeline documents.
///
/// Parse failures short-circuit with a single issue; every other rule runs
/// to completion so the caller sees all problems at once.
///
/// # Examples
///
/// ```
/// use fleetplane::pipeline::ports::ConfigValidator;
/// use fleetplane::pipeline::validation::DefaultConfigValidator;
///
/// let yaml = "receivers: {otlp: {}}\nprocessors: {batch: {}}\nexporters: {debug: {}}\n\
///             service:\n  pipelines:\n    traces:\n      receivers: [otlp]\n      \
///             processors: [batch]\n      exporters: [debug]\n";
/// let report = DefaultConfigValidator::new().validate(yaml);
/// assert!(report.is_valid());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfigValidator;

impl DefaultConfigValidator {
    /// Creates the validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ConfigValidator for DefaultConfigValidator {
    fn validate(&self, content: &str) -> ValidationReport {
        let hash = ConfigHash::of(content.as_bytes());
        let root = match rules::parse_root(content) {
            Ok(root) => root,
            Err(issue) => return ValidationReport::new(vec![issue], Vec::new(), hash),
        };

        let mut findings = Findings::default();
        let [receivers, processors, exporters, service] =
            REQUIRED_SECTIONS.map(|section| rules::required_section(&root, section, &mut findings));
        let components = Components {
            receivers,
            processors,
            exporters,
        };

        if let Some(service_section) = service {
            rules::check_pipelines(service_section, components, &mut findings);
            rules::check_extensions(&root, service_section, &mut findings);
        }
        rules::check_completeness(components, &mut findings);

        ValidationReport::new(findings.errors, findings.warnings, hash)
    }
}
