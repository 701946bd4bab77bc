//! Enrollment and OpAMP exchanges driven through the protocol handler.

use super::helpers::{CONFIG, enroll, org_id, plane, report};
use fleetplane::agent::domain::{Agent, ConnectionStatus, DeploymentMode, TransportType};
use fleetplane::app::InMemoryControlPlane;
use fleetplane::capability::AgentCapabilities;
use fleetplane::opamp::proto::{AgentToServer, RemoteConfigStatus, RemoteConfigStatuses, ServerToAgent};
use fleetplane::opamp::{DecodedMessage, Principal, ProtocolHandler, Session};
use fleetplane::pipeline::domain::ConfigHash;
use fleetplane::rollout::domain::{ConfigDeployment, DeploymentStatus, RolloutStrategy};
use fleetplane::rollout::services::CreateDeploymentRequest;
use rstest::rstest;
use std::sync::Arc;

async fn connect(handler: &Arc<dyn ProtocolHandler>, agent: &Agent) -> Session {
    handler
        .open_session(
            Principal {
                org_id: agent.org_id(),
                instance_uid: agent.instance_uid().clone(),
            },
            TransportType::WebSocket,
        )
        .await
        .expect("session opens")
}

async fn exchange(
    handler: &Arc<dyn ProtocolHandler>,
    session: &Session,
    message: AgentToServer,
) -> ServerToAgent {
    handler
        .handle(session, DecodedMessage::strict(message))
        .await
        .expect("message is processed")
}

fn applied(uid: &str, sequence_num: u64, hash: ConfigHash) -> AgentToServer {
    AgentToServer {
        remote_config_status: Some(RemoteConfigStatus {
            last_remote_config_hash: hash.as_bytes().to_vec(),
            status: RemoteConfigStatuses::Applied.into(),
            error_message: String::new(),
        }),
        ..report(uid, sequence_num, AgentCapabilities::ACCEPTS_REMOTE_CONFIG)
    }
}

async fn deploy_to_edge(plane: &InMemoryControlPlane, name: &str, content: &str) -> ConfigDeployment {
    plane
        .deployments()
        .create_deployment(
            CreateDeploymentRequest::new(org_id(), name, content).with_target_tags(["edge"]),
        )
        .await
        .expect("deployment is created")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn enrollment_registers_every_agent_idempotently(plane: InMemoryControlPlane) {
    let first = enroll(&plane).await;
    let second = enroll(&plane).await;

    let edge = first.first().expect("edge agent enrolled");
    assert_eq!(first.len(), 2);
    assert_eq!(
        first.iter().map(Agent::id).collect::<Vec<_>>(),
        second.iter().map(Agent::id).collect::<Vec<_>>()
    );
    assert_eq!(edge.name(), Some("edge collector"));
    assert_eq!(edge.deployment_mode(), DeploymentMode::Supervisor);
    assert_eq!(
        edge.tags().iter().map(|tag| tag.as_str().to_owned()).collect::<Vec<_>>(),
        vec!["edge".to_owned(), "eu-west".to_owned()]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tagged_deployments_reach_only_matching_agents(plane: InMemoryControlPlane) {
    let agents = enroll(&plane).await;
    let handler = plane.handler();
    let (edge, gateway) = match agents.as_slice() {
        [edge, gateway] => (edge, gateway),
        other => panic!("expected two agents, got {}", other.len()),
    };
    let edge_session = connect(&handler, edge).await;
    let gateway_session = connect(&handler, gateway).await;
    let deployment = deploy_to_edge(&plane, "edge-pipeline", CONFIG).await;

    let edge_reply = exchange(
        &handler,
        &edge_session,
        report("edge-01", 1, AgentCapabilities::ACCEPTS_REMOTE_CONFIG),
    )
    .await;
    let gateway_reply = exchange(
        &handler,
        &gateway_session,
        report("gateway-01", 1, AgentCapabilities::ACCEPTS_REMOTE_CONFIG),
    )
    .await;

    let offered = edge_reply.remote_config.expect("edge receives the config");
    assert_eq!(offered.config_hash, deployment.hash().as_bytes());
    assert!(gateway_reply.remote_config.is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn applied_reports_complete_the_deployment(plane: InMemoryControlPlane) {
    let agents = enroll(&plane).await;
    let handler = plane.handler();
    let edge = agents.first().expect("edge agent enrolled");
    let session = connect(&handler, edge).await;
    let deployment = deploy_to_edge(&plane, "edge-pipeline", CONFIG).await;

    exchange(
        &handler,
        &session,
        report("edge-01", 1, AgentCapabilities::ACCEPTS_REMOTE_CONFIG),
    )
    .await;
    exchange(&handler, &session, applied("edge-01", 2, deployment.hash())).await;
    let status = plane
        .deployments()
        .get_status(deployment.id())
        .await
        .expect("status loads");

    assert_eq!(status.deployment.status(), DeploymentStatus::Completed);
    assert_eq!(status.progress.total, 1);
    assert_eq!(status.progress.applied, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rollback_resends_the_previous_configuration(plane: InMemoryControlPlane) {
    let agents = enroll(&plane).await;
    let handler = plane.handler();
    let edge = agents.first().expect("edge agent enrolled");
    let session = connect(&handler, edge).await;
    let accepts = AgentCapabilities::ACCEPTS_REMOTE_CONFIG;

    let first = deploy_to_edge(&plane, "edge-pipeline", CONFIG).await;
    exchange(&handler, &session, report("edge-01", 1, accepts)).await;
    exchange(&handler, &session, applied("edge-01", 2, first.hash())).await;
    let second = deploy_to_edge(
        &plane,
        "edge-pipeline-debug",
        &CONFIG.replace("batch: {}", "batch:\n    timeout: 5s"),
    )
    .await;
    exchange(&handler, &session, report("edge-01", 3, accepts)).await;
    exchange(&handler, &session, applied("edge-01", 4, second.hash())).await;

    let summary = plane
        .deployments()
        .rollback(second.id())
        .await
        .expect("rollback succeeds");
    let reply = exchange(&handler, &session, report("edge-01", 5, accepts)).await;

    assert_eq!(
        summary.rearmed.iter().map(|target| target.version).collect::<Vec<_>>(),
        vec![first.version()]
    );
    let resent = reply.remote_config.expect("previous config is resent");
    assert_eq!(resent.config_hash, first.hash().as_bytes());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn canary_cohorts_grow_when_advanced(plane: InMemoryControlPlane) {
    enroll(&plane).await;
    let deployment = plane
        .deployments()
        .create_deployment(
            CreateDeploymentRequest::new(org_id(), "fleet-wide", CONFIG)
                .with_strategy(RolloutStrategy::canary(50).expect("valid canary")),
        )
        .await
        .expect("deployment is created");

    let canary = plane
        .deployments()
        .get_audit(deployment.id())
        .await
        .expect("audit loads");
    let advanced = plane
        .deployments()
        .advance_stage(deployment.id(), None)
        .await
        .expect("stage advances");

    assert_eq!(canary.len(), 1);
    assert_eq!(advanced.percentage, 100);
    assert_eq!(advanced.added.len(), 1);
    assert_eq!(advanced.deployment.status(), DeploymentStatus::InProgress);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn heartbeat_settings_reach_agents_that_accept_them(plane: InMemoryControlPlane) {
    let agents = enroll(&plane).await;
    let published = plane
        .offer_heartbeat([org_id()], 30)
        .await
        .expect("settings are published");
    let handler = plane.handler();
    let gateway = agents.get(1).expect("gateway agent enrolled");
    let session = connect(&handler, gateway).await;

    let reply = exchange(
        &handler,
        &session,
        report(
            "gateway-01",
            1,
            AgentCapabilities::ACCEPTS_OPAMP_CONNECTION_SETTINGS,
        ),
    )
    .await;

    assert_eq!(published, 1);
    let settings = reply.connection_settings.expect("settings are offered");
    assert_eq!(
        settings.opamp.map(|opamp| opamp.heartbeat_interval_seconds),
        Some(30)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn closing_the_session_disconnects_the_agent(plane: InMemoryControlPlane) {
    let agents = enroll(&plane).await;
    let handler = plane.handler();
    let edge = agents.first().expect("edge agent enrolled");
    let session = connect(&handler, edge).await;

    handler
        .close_session(&session)
        .await
        .expect("session closes");
    let stored = plane
        .directory()
        .find(edge.id())
        .await
        .expect("lookup succeeds")
        .expect("agent exists");

    assert_eq!(stored.connection_status(), ConnectionStatus::Disconnected);
}
