//! Individual structural checks.
//!
//! Each rule inspects one part of the parsed document and appends to the
//! shared [`Findings`] rather than failing fast, so a single validation pass
//! reports every problem.

use crate::pipeline::domain::{ComponentKind, ValidationIssue, ValidationWarning};
use serde_yaml::{Mapping, Value};

pub(super) const REQUIRED_SECTIONS: [&str; 4] = ["receivers", "processors", "exporters", "service"];
const KNOWN_SIGNALS: [&str; 3] = ["traces", "metrics", "logs"];

#[derive(Debug, Default)]
pub(super) struct Findings {
    pub(super) errors: Vec<ValidationIssue>,
    pub(super) warnings: Vec<ValidationWarning>,
}

/// Parses the document and requires a mapping at its root.
pub(super) fn parse_root(content: &str) -> Result<Mapping, ValidationIssue> {
    let document: Value =
        serde_yaml::from_str(content).map_err(|err| ValidationIssue::Unparseable {
            reason: err.to_string(),
        })?;
    match document {
        Value::Mapping(root) => Ok(root),
        _ => Err(ValidationIssue::RootNotMapping),
    }
}

/// Returns the named top-level section, recording an error when it is
/// absent or malformed.
pub(super) fn required_section<'a>(
    root: &'a Mapping,
    section: &'static str,
    findings: &mut Findings,
) -> Option<&'a Mapping> {
    match root.get(section) {
        None => {
            findings
                .errors
                .push(ValidationIssue::MissingSection { section });
            None
        }
        Some(Value::Mapping(map)) => Some(map),
        Some(_) => {
            findings
                .errors
                .push(ValidationIssue::SectionNotMapping { section });
            None
        }
    }
}

/// Defined component names by kind, as resolved from the top level.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct Components<'a> {
    pub(super) receivers: Option<&'a Mapping>,
    pub(super) processors: Option<&'a Mapping>,
    pub(super) exporters: Option<&'a Mapping>,
}

impl Components<'_> {
    const fn section(&self, kind: ComponentKind) -> Option<&Mapping> {
        match kind {
            ComponentKind::Receivers => self.receivers,
            ComponentKind::Processors => self.processors,
            ComponentKind::Exporters => self.exporters,
        }
    }
}

/// Checks every pipeline under `service.pipelines`.
pub(super) fn check_pipelines(service: &Mapping, components: Components<'_>, findings: &mut Findings) {
    let pipelines = match service.get("pipelines") {
        Some(Value::Mapping(pipelines)) if !pipelines.is_empty() => pipelines,
        _ => {
            findings.errors.push(ValidationIssue::MissingPipelines);
            return;
        }
    };

    for (key, definition) in pipelines {
        let pipeline = key_name(key);
        if !is_known_signal(&pipeline) {
            findings.warnings.push(ValidationWarning::UnknownSignal {
                pipeline: pipeline.clone(),
            });
        }
        let Value::Mapping(body) = definition else {
            findings
                .errors
                .push(ValidationIssue::PipelineNotMapping { pipeline });
            continue;
        };
        for field in ComponentKind::ALL {
            check_pipeline_field(&pipeline, body, field, components, findings);
        }
    }
}

fn check_pipeline_field(
    pipeline: &str,
    body: &Mapping,
    field: ComponentKind,
    components: Components<'_>,
    findings: &mut Findings,
) {
    let entries = match body.get(field.as_str()) {
        None => {
            findings.errors.push(ValidationIssue::MissingPipelineField {
                pipeline: pipeline.to_owned(),
                field,
            });
            return;
        }
        Some(Value::Sequence(entries)) => entries,
        Some(Value::Null) => {
            findings.warnings.push(ValidationWarning::EmptyPipelineField {
                pipeline: pipeline.to_owned(),
                field,
            });
            return;
        }
        Some(_) => {
            findings.errors.push(ValidationIssue::PipelineFieldNotList {
                pipeline: pipeline.to_owned(),
                field,
            });
            return;
        }
    };

    if entries.is_empty() {
        findings.warnings.push(ValidationWarning::EmptyPipelineField {
            pipeline: pipeline.to_owned(),
            field,
        });
        return;
    }

    // A missing or malformed top-level section is already reported; avoid
    // repeating it once per reference.
    let Some(defined) = components.section(field) else {
        return;
    };
    for entry in entries {
        if !defined.contains_key(entry) {
            findings.errors.push(ValidationIssue::UndefinedComponent {
                pipeline: pipeline.to_owned(),
                field,
                component: key_name(entry),
            });
        }
    }
}

/// Cross-checks `service.extensions` against the top-level `extensions` map.
pub(super) fn check_extensions(root: &Mapping, service: &Mapping, findings: &mut Findings) {
    let entries = match service.get("extensions") {
        None | Some(Value::Null) => return,
        Some(Value::Sequence(entries)) => entries,
        Some(_) => {
            findings.errors.push(ValidationIssue::ExtensionsNotList);
            return;
        }
    };
    let defined = match root.get("extensions") {
        Some(Value::Mapping(defined)) => Some(defined),
        _ => None,
    };
    for entry in entries {
        if !defined.is_some_and(|map| map.contains_key(entry)) {
            findings.errors.push(ValidationIssue::UndefinedExtension {
                extension: key_name(entry),
            });
        }
    }
}

/// Warns when the document defines no receivers or no exporters at all.
pub(super) fn check_completeness(components: Components<'_>, findings: &mut Findings) {
    if components.receivers.is_some_and(Mapping::is_empty) {
        findings.warnings.push(ValidationWarning::NoReceivers);
    }
    if components.exporters.is_some_and(Mapping::is_empty) {
        findings.warnings.push(ValidationWarning::NoExporters);
    }
}

fn is_known_signal(pipeline: &str) -> bool {
    let signal = pipeline.split('/').next().unwrap_or(pipeline);
    KNOWN_SIGNALS.contains(&signal)
}

fn key_name(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_yaml::to_string(other)
            .map_or_else(|_| format!("{other:?}"), |text| text.trim_end().to_owned()),
    }
}
