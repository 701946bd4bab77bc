//! Rule-by-rule tests for the default validator.

use crate::pipeline::{
    domain::{ComponentKind, ConfigHash, ValidationIssue, ValidationWarning},
    ports::ConfigValidator,
    validation::DefaultConfigValidator,
};
use rstest::{fixture, rstest};

const VALID: &str = "\
receivers:
  otlp: {}
processors:
  batch: {}
exporters:
  debug: {}
extensions:
  health_check: {}
service:
  extensions: [health_check]
  pipelines:
    traces:
      receivers: [otlp]
      processors: [batch]
      exporters: [debug]
    metrics/internal:
      receivers: [otlp]
      processors: [batch]
      exporters: [debug]
";

#[fixture]
fn validator() -> DefaultConfigValidator {
    DefaultConfigValidator::new()
}

#[rstest]
fn well_formed_config_is_valid(validator: DefaultConfigValidator) {
    let report = validator.validate(VALID);
    assert!(report.is_valid(), "unexpected issues: {report}");
    assert!(report.warnings().is_empty());
    assert_eq!(report.hash(), ConfigHash::of(VALID.as_bytes()));
}

#[rstest]
fn unparseable_document_is_a_single_fatal_error(validator: DefaultConfigValidator) {
    let report = validator.validate("receivers: [unclosed\n  - : :");
    assert!(!report.is_valid());
    assert_eq!(report.errors().len(), 1);
    assert!(matches!(
        report.errors().first(),
        Some(ValidationIssue::Unparseable { .. })
    ));
}

#[rstest]
#[case::scalar("just a string")]
#[case::list("- a\n- b\n")]
fn non_mapping_root_is_rejected(validator: DefaultConfigValidator, #[case] content: &str) {
    let report = validator.validate(content);
    assert_eq!(report.errors(), [ValidationIssue::RootNotMapping]);
}

#[rstest]
#[case("receivers")]
#[case("processors")]
#[case("exporters")]
#[case("service")]
fn missing_section_is_named(validator: DefaultConfigValidator, #[case] section: &'static str) {
    let content = VALID
        .lines()
        .scan(false, |skipping, line| {
            if !line.starts_with(' ') {
                *skipping = line.starts_with(&format!("{section}:"));
            }
            Some((*skipping, line))
        })
        .filter(|(skipping, _)| !skipping)
        .map(|(_, line)| format!("{line}\n"))
        .collect::<String>();

    let report = validator.validate(&content);

    assert!(!report.is_valid());
    assert!(
        report
            .errors()
            .contains(&ValidationIssue::MissingSection { section }),
        "expected missing '{section}' in {report}"
    );
}

#[rstest]
#[case::list("exporters", "exporters:\n  debug: {}", "exporters: [debug]")]
#[case::bare_receivers("receivers", "receivers:\n  otlp: {}", "receivers:")]
#[case::bare_processors("processors", "processors:\n  batch: {}", "processors:")]
#[case::bare_exporters("exporters", "exporters:\n  debug: {}", "exporters:")]
#[case::null_exporters("exporters", "exporters:\n  debug: {}", "exporters: ~")]
fn non_mapping_section_is_an_error(
    validator: DefaultConfigValidator,
    #[case] section: &'static str,
    #[case] from: &str,
    #[case] to: &str,
) {
    let report = validator.validate(&VALID.replace(from, to));

    assert!(!report.is_valid());
    assert!(
        report
            .errors()
            .contains(&ValidationIssue::SectionNotMapping { section }),
        "expected non-mapping '{section}' in {report}"
    );
}

#[rstest]
#[case::absent("service:\n  telemetry: {}\n")]
#[case::empty("service:\n  pipelines: {}\n")]
fn pipelines_must_be_a_non_empty_mapping(validator: DefaultConfigValidator, #[case] service: &str) {
    let content = format!(
        "receivers: {{otlp: {{}}}}\nprocessors: {{}}\nexporters: {{debug: {{}}}}\n{service}"
    );
    let report = validator.validate(&content);
    assert!(report.errors().contains(&ValidationIssue::MissingPipelines));
}

#[rstest]
fn missing_pipeline_list_is_an_error(validator: DefaultConfigValidator) {
    let report = validator.validate(&VALID.replacen("      processors: [batch]\n", "", 1));
    assert_eq!(
        report.errors(),
        [ValidationIssue::MissingPipelineField {
            pipeline: "traces".to_owned(),
            field: ComponentKind::Processors,
        }]
    );
}

#[rstest]
fn empty_pipeline_list_is_a_warning(validator: DefaultConfigValidator) {
    let report = validator.validate(&VALID.replacen("processors: [batch]", "processors: []", 1));
    assert!(report.is_valid());
    assert_eq!(
        report.warnings(),
        [ValidationWarning::EmptyPipelineField {
            pipeline: "traces".to_owned(),
            field: ComponentKind::Processors,
        }]
    );
}

#[rstest]
fn dangling_reference_names_pipeline_and_field(validator: DefaultConfigValidator) {
    let report = validator.validate(&VALID.replacen("exporters: [debug]", "exporters: [otlphttp]", 1));
    assert_eq!(
        report.errors(),
        [ValidationIssue::UndefinedComponent {
            pipeline: "traces".to_owned(),
            field: ComponentKind::Exporters,
            component: "otlphttp".to_owned(),
        }]
    );
    let rendered = report.to_string();
    assert!(rendered.contains("traces") && rendered.contains("otlphttp"));
}

#[rstest]
fn dangling_extension_is_an_error(validator: DefaultConfigValidator) {
    let report =
        validator.validate(&VALID.replace("extensions: [health_check]", "extensions: [pprof]"));
    assert_eq!(
        report.errors(),
        [ValidationIssue::UndefinedExtension {
            extension: "pprof".to_owned(),
        }]
    );
}

#[rstest]
fn unknown_signal_prefix_is_a_warning(validator: DefaultConfigValidator) {
    let report = validator.validate(&VALID.replace("metrics/internal:", "profiles/internal:"));
    assert!(report.is_valid());
    assert_eq!(
        report.warnings(),
        [ValidationWarning::UnknownSignal {
            pipeline: "profiles/internal".to_owned(),
        }]
    );
}

#[rstest]
fn empty_component_sections_produce_completeness_warnings(validator: DefaultConfigValidator) {
    let content = "\
receivers: {}
processors: {}
exporters: {}
service:
  pipelines:
    logs:
      receivers: []
      processors: []
      exporters: []
";
    let report = validator.validate(content);
    assert!(report.is_valid(), "unexpected issues: {report}");
    assert!(report.warnings().contains(&ValidationWarning::NoReceivers));
    assert!(report.warnings().contains(&ValidationWarning::NoExporters));
}

#[rstest]
fn invalid_documents_still_carry_the_hash(validator: DefaultConfigValidator) {
    let content = "not: [valid";
    assert_eq!(
        validator.validate(content).hash(),
        ConfigHash::of(content.as_bytes())
    );
}
