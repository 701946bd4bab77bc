//! Tests for the in-memory deployment repository contract.

use crate::agent::domain::{AgentId, OrgId, TagMatch};
use crate::rollout::{
    adapters::memory::InMemoryDeploymentRepository,
    domain::{
        AuditStatus, ConfigAudit, ConfigDeployment, ConfigVersion, DeploymentName, NewDeployment,
        RolloutStrategy,
    },
    ports::{DeploymentRepository, DeploymentRepositoryError},
};
use mockable::DefaultClock;
use rstest::{fixture, rstest};

#[fixture]
fn repository() -> InMemoryDeploymentRepository {
    InMemoryDeploymentRepository::new()
}

fn deployment(org_id: OrgId, version: u64) -> ConfigDeployment {
    ConfigDeployment::new(
        NewDeployment {
            org_id,
            name: DeploymentName::new(format!("rollout {version}")).expect("valid name"),
            version: ConfigVersion::new(version),
            content: format!("# revision {version}\nreceivers: {{}}\n"),
            strategy: RolloutStrategy::Immediate,
            target_tags: Vec::new(),
            tag_match: TagMatch::Any,
            validation_overridden: false,
        },
        &DefaultClock,
    )
}

fn audit_for(deployment: &ConfigDeployment, agent_id: AgentId) -> ConfigAudit {
    ConfigAudit::pending(
        deployment.id(),
        deployment.org_id(),
        deployment.version(),
        deployment.hash(),
        agent_id,
        &DefaultClock,
    )
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reused_version_is_rejected(repository: InMemoryDeploymentRepository) {
    let org_id = OrgId::new();
    repository
        .insert(&deployment(org_id, 1), &[])
        .await
        .expect("first insert succeeds");
    let clash = deployment(org_id, 1);

    let result = repository.insert(&clash, &[]).await;

    assert!(matches!(
        result,
        Err(DeploymentRepositoryError::DuplicateDeployment(id)) if id == clash.id()
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_row_for_same_agent_is_rejected(repository: InMemoryDeploymentRepository) {
    let created = deployment(OrgId::new(), 1);
    let agent_id = AgentId::new();
    repository
        .insert(&created, &[audit_for(&created, agent_id)])
        .await
        .expect("insert succeeds");

    let result = repository
        .insert_audits(&[audit_for(&created, agent_id)])
        .await;

    assert!(matches!(
        result,
        Err(DeploymentRepositoryError::DuplicateAudit { agent_id: duplicate, .. })
            if duplicate == agent_id
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn audits_for_unknown_deployment_are_rejected(repository: InMemoryDeploymentRepository) {
    let orphan = deployment(OrgId::new(), 9);

    let result = repository
        .insert_audits(&[audit_for(&orphan, AgentId::new())])
        .await;

    assert!(matches!(result, Err(DeploymentRepositoryError::NotFound(id)) if id == orphan.id()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn conditional_audit_write_detects_a_moved_row(repository: InMemoryDeploymentRepository) {
    let created = deployment(OrgId::new(), 1);
    let mut audit = audit_for(&created, AgentId::new());
    repository
        .insert(&created, std::slice::from_ref(&audit))
        .await
        .expect("insert succeeds");
    audit.mark_sent(&DefaultClock).expect("pending row can be sent");
    repository
        .update_audit(&audit, AuditStatus::Pending)
        .await
        .expect("first claim succeeds");

    let result = repository.update_audit(&audit, AuditStatus::Pending).await;

    assert!(matches!(
        result,
        Err(DeploymentRepositoryError::StaleAudit {
            expected: AuditStatus::Pending,
            ..
        })
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn writing_a_missing_audit_row_fails(repository: InMemoryDeploymentRepository) {
    let created = deployment(OrgId::new(), 1);
    repository.insert(&created, &[]).await.expect("insert succeeds");

    let result = repository
        .update_audit(&audit_for(&created, AgentId::new()), AuditStatus::Pending)
        .await;

    assert!(matches!(result, Err(DeploymentRepositoryError::AuditNotFound { .. })));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn listings_are_newest_first_and_org_scoped(repository: InMemoryDeploymentRepository) {
    let org_id = OrgId::new();
    for version in [2, 5, 3] {
        repository
            .insert(&deployment(org_id, version), &[])
            .await
            .expect("insert succeeds");
    }
    repository
        .insert(&deployment(OrgId::new(), 4), &[])
        .await
        .expect("insert succeeds");

    let versions: Vec<u64> = repository
        .list_by_org(org_id)
        .await
        .expect("list succeeds")
        .iter()
        .map(|deployment| deployment.version().value())
        .collect();

    assert_eq!(versions, vec![5, 3, 2]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn next_pending_prefers_the_newest_version(repository: InMemoryDeploymentRepository) {
    let org_id = OrgId::new();
    let agent_id = AgentId::new();
    let older = deployment(org_id, 1);
    let newer = deployment(org_id, 2);
    let settled = deployment(org_id, 3);
    for created in [&older, &newer, &settled] {
        repository
            .insert(created, &[audit_for(created, agent_id)])
            .await
            .expect("insert succeeds");
    }
    let mut applied = repository
        .list_audits(settled.id())
        .await
        .expect("list succeeds")
        .into_iter()
        .next()
        .expect("row exists");
    applied.record_report(AuditStatus::Applied, None, &DefaultClock);
    repository
        .update_audit(&applied, AuditStatus::Pending)
        .await
        .expect("report is stored");

    let next = repository
        .next_pending_audit(agent_id)
        .await
        .expect("lookup succeeds")
        .expect("a pending row exists");
    let by_hash = repository
        .find_audit_by_hash(agent_id, older.hash())
        .await
        .expect("lookup succeeds");

    assert_eq!(next.deployment_id(), newer.id());
    assert_eq!(by_hash.map(|audit| audit.deployment_id()), Some(older.id()));
}
