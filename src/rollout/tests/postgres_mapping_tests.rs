//! Tests for the deployment and audit row mapping used by the `PostgreSQL`
//! adapter.

use crate::agent::domain::{AgentId, AgentTag, OrgId, TagMatch};
use crate::rollout::{
    adapters::postgres::{audit_to_row, deployment_to_row, row_to_audit, row_to_deployment},
    domain::{
        AuditStatus, ConfigAudit, ConfigDeployment, ConfigVersion, DeploymentName,
        DeploymentStatus, NewDeployment, RolloutStrategy,
    },
    ports::DeploymentRepositoryError,
};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn deployment() -> ConfigDeployment {
    let mut deployment = ConfigDeployment::new(
        NewDeployment {
            org_id: OrgId::new(),
            name: DeploymentName::new("edge rollout").expect("valid name"),
            version: ConfigVersion::new(17),
            content: "receivers: {}\n".to_owned(),
            strategy: RolloutStrategy::staged(vec![5, 25, 50]).expect("valid stages"),
            target_tags: vec![AgentTag::new("prod").expect("valid tag")],
            tag_match: TagMatch::All,
            validation_overridden: true,
        },
        &DefaultClock,
    );
    deployment
        .transition_to(DeploymentStatus::InProgress, &DefaultClock)
        .expect("pending deployments can start");
    assert_eq!(deployment.advance_stage(&DefaultClock), Some(25));
    deployment
}

#[rstest]
fn deployment_row_mapping_preserves_every_field(deployment: ConfigDeployment) {
    let row = deployment_to_row(&deployment).expect("maps to row");

    assert_eq!(row.version, 17);
    assert_eq!(row.current_stage, 1);
    assert_eq!(row_to_deployment(row).expect("maps back"), deployment);
}

#[rstest]
fn audit_row_mapping_preserves_every_field(deployment: ConfigDeployment) {
    let mut audit = ConfigAudit::pending(
        deployment.id(),
        deployment.org_id(),
        deployment.version(),
        deployment.hash(),
        AgentId::new(),
        &DefaultClock,
    );
    audit.mark_sent(&DefaultClock).expect("pending row can be sent");
    audit.record_report(
        AuditStatus::Failed,
        Some("exporter unreachable".to_owned()),
        &DefaultClock,
    );

    let row = audit_to_row(&audit).expect("maps to row");

    assert_eq!(row.status, "failed");
    assert_eq!(row_to_audit(row).expect("maps back"), audit);
}

#[rstest]
#[case(json!({ "kind": "canary", "percentage": 0 }))]
#[case(json!({ "kind": "staged", "stages": [50, 10] }))]
#[case(json!({ "kind": "blue_green" }))]
fn corrupt_strategy_column_is_a_persistence_error(
    deployment: ConfigDeployment,
    #[case] strategy: serde_json::Value,
) {
    let mut row = deployment_to_row(&deployment).expect("maps to row");
    row.strategy = strategy;

    assert!(matches!(
        row_to_deployment(row),
        Err(DeploymentRepositoryError::Persistence(_))
    ));
}

#[rstest]
fn negative_version_column_is_a_persistence_error(deployment: ConfigDeployment) {
    let mut row = deployment_to_row(&deployment).expect("maps to row");
    row.version = -1;

    assert!(matches!(
        row_to_deployment(row),
        Err(DeploymentRepositoryError::Persistence(_))
    ));
}
