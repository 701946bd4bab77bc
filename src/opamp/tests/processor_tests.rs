//! Tests for the per-message state machine.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::agent::{
    adapters::memory::InMemoryAgentRepository,
    domain::{Agent, ConnectionStatus, DeploymentMode, InstanceUid, OrgId, TransportType},
    services::{AgentDirectoryService, RegisterAgentRequest},
};
use crate::capability::{AgentCapabilities, ServerCapabilities};
use crate::distribution::{
    adapters::memory::InMemoryDistributionRepository,
    domain::{ConnectionSettingsOffer, PackageStatus},
    services::{DistributionService, PublishPackageRequest},
};
use crate::opamp::{
    codec::{DecodeTier, DecodedMessage},
    convert::CONFIG_FILE_NAME,
    error::{Disposition, ProcessingError},
    processor::MessageProcessor,
    proto::{
        self, AgentDescription, AgentDisconnect, AgentToServer, AgentToServerFlags, AnyValue,
        ComponentHealth, KeyValue, PackageStatusEnum, PackageStatuses, RemoteConfigStatuses,
        ServerToAgent, ServerToAgentFlags, any_value,
    },
    session::{Principal, ProtocolHandler, Session},
};
use crate::pipeline::{domain::ConfigHash, validation::DefaultConfigValidator};
use crate::rollout::{
    adapters::memory::{AtomicVersionSequence, InMemoryDeploymentRepository},
    domain::{AuditStatus, ConfigDeployment},
    services::{CreateDeploymentRequest, DeploymentService},
};
use mockable::DefaultClock;
use rstest::{fixture, rstest};

const CONFIG: &str = "\
receivers:
  otlp:
    protocols:
      grpc: {}
processors:
  batch: {}
exporters:
  debug: {}
service:
  pipelines:
    traces:
      receivers: [otlp]
      processors: [batch]
      exporters: [debug]
";

type TestDeployments = DeploymentService<
    InMemoryDeploymentRepository,
    InMemoryAgentRepository,
    AtomicVersionSequence,
    DefaultClock,
>;

type TestDistribution = DistributionService<InMemoryDistributionRepository, DefaultClock>;

type TestProcessor = MessageProcessor<
    InMemoryAgentRepository,
    InMemoryDeploymentRepository,
    AtomicVersionSequence,
    InMemoryDistributionRepository,
    DefaultClock,
>;

struct Harness {
    org_id: OrgId,
    directory: AgentDirectoryService<InMemoryAgentRepository, DefaultClock>,
    deployments: Arc<TestDeployments>,
    distribution: Arc<TestDistribution>,
    processor: TestProcessor,
}

impl Harness {
    fn build(capabilities: ServerCapabilities) -> Self {
        let agents = Arc::new(InMemoryAgentRepository::new());
        let clock = Arc::new(DefaultClock);
        let directory = AgentDirectoryService::new(Arc::clone(&agents), Arc::clone(&clock));
        let deployments = Arc::new(DeploymentService::new(
            Arc::new(InMemoryDeploymentRepository::new()),
            Arc::new(AtomicVersionSequence::new()),
            Arc::clone(&agents),
            Arc::new(DefaultConfigValidator::new()),
            Arc::clone(&clock),
        ));
        let distribution = Arc::new(DistributionService::new(
            Arc::new(InMemoryDistributionRepository::new()),
            clock,
        ));
        Self {
            org_id: OrgId::new(),
            processor: MessageProcessor::new(
                directory.clone(),
                Arc::clone(&deployments),
                Arc::clone(&distribution),
                capabilities,
            ),
            directory,
            deployments,
            distribution,
        }
    }

    async fn connect(&self, uid: &str, transport: TransportType) -> Session {
        let agent = self
            .directory
            .register(RegisterAgentRequest::new(self.org_id, uid))
            .await
            .expect("registration succeeds");
        self.processor
            .open_session(self.principal(&agent), transport)
            .await
            .expect("session opens")
    }

    fn principal(&self, agent: &Agent) -> Principal {
        Principal {
            org_id: self.org_id,
            instance_uid: agent.instance_uid().clone(),
        }
    }

    async fn send(&self, session: &Session, message: AgentToServer) -> ServerToAgent {
        self.processor
            .handle(session, DecodedMessage::strict(message))
            .await
            .expect("message is processed")
    }

    async fn agent(&self, session: &Session) -> Agent {
        self.directory
            .find(session.agent_id)
            .await
            .expect("lookup succeeds")
            .expect("agent exists")
    }

    async fn deploy(&self) -> ConfigDeployment {
        self.deployments
            .create_deployment(CreateDeploymentRequest::new(self.org_id, "edge", CONFIG))
            .await
            .expect("deployment is created")
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::build(ServerCapabilities::SUPPORTED)
}

fn message(session: &Session, sequence_num: u64, capabilities: AgentCapabilities) -> AgentToServer {
    AgentToServer {
        instance_uid: session.principal.instance_uid.to_wire(),
        sequence_num,
        capabilities: capabilities.encode(),
        ..AgentToServer::default()
    }
}

fn text(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_owned(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_owned())),
        }),
    }
}

fn applied(hash: ConfigHash) -> proto::RemoteConfigStatus {
    proto::RemoteConfigStatus {
        last_remote_config_hash: hash.as_bytes().to_vec(),
        status: RemoteConfigStatuses::Applied.into(),
        error_message: String::new(),
    }
}

fn effective(content: &str) -> proto::EffectiveConfig {
    proto::EffectiveConfig {
        config_map: Some(proto::AgentConfigMap {
            config_map: HashMap::from([(
                CONFIG_FILE_NAME.to_owned(),
                proto::AgentConfigFile {
                    body: content.as_bytes().to_vec(),
                    content_type: "text/yaml".to_owned(),
                },
            )]),
        }),
    }
}

fn full_state_flag() -> u64 {
    u64::from(i32::from(ServerToAgentFlags::ReportFullState).unsigned_abs())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unregistered_agents_are_refused(harness: Harness) {
    let principal = Principal {
        org_id: harness.org_id,
        instance_uid: InstanceUid::new("ghost").expect("valid uid"),
    };

    let error = harness
        .processor
        .open_session(principal, TransportType::WebSocket)
        .await
        .expect_err("unknown agents are refused");

    assert!(matches!(error, ProcessingError::UnknownAgent { .. }));
    assert_eq!(error.disposition(), Disposition::Close);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn opening_a_session_marks_the_agent_connected(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;

    let agent = harness.agent(&session).await;

    assert_eq!(agent.connection_status(), ConnectionStatus::Connected);
    assert_eq!(agent.transport(), Some(TransportType::WebSocket));
    assert!(agent.last_seen_at().is_some());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn responses_carry_identity_and_capabilities(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;

    let response = harness
        .send(&session, message(&session, 1, AgentCapabilities::REPORTS_STATUS))
        .await;
    let agent = harness.agent(&session).await;

    assert_eq!(response.instance_uid, agent.instance_uid().to_wire());
    assert_eq!(response.capabilities, ServerCapabilities::SUPPORTED.encode());
    assert!(response.error_response.is_none());
    assert_eq!(agent.server_capabilities(), ServerCapabilities::SUPPORTED);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn older_sequence_numbers_never_move_the_counter_back(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;

    harness
        .send(&session, message(&session, 5, AgentCapabilities::REPORTS_STATUS))
        .await;
    harness
        .send(&session, message(&session, 3, AgentCapabilities::REPORTS_STATUS))
        .await;

    assert_eq!(harness.agent(&session).await.last_sequence_num(), 5);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sequence_gaps_request_full_state(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;
    let capabilities = AgentCapabilities::REPORTS_STATUS | AgentCapabilities::REPORTS_EFFECTIVE_CONFIG;
    let first = AgentToServer {
        effective_config: Some(effective(CONFIG)),
        ..message(&session, 1, capabilities)
    };

    let settled = harness.send(&session, first).await;
    let after_gap = harness.send(&session, message(&session, 4, capabilities)).await;

    assert_eq!(settled.flags & full_state_flag(), 0);
    assert_ne!(after_gap.flags & full_state_flag(), 0);
    assert_eq!(harness.agent(&session).await.last_sequence_num(), 4);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn supervisors_reporting_no_capabilities_get_the_assumed_set(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;
    let described = AgentToServer {
        agent_description: Some(AgentDescription {
            identifying_attributes: vec![text("service.name", "edge-collector")],
            non_identifying_attributes: vec![text("fleet.deployment.mode", "supervisor")],
        }),
        ..message(&session, 1, AgentCapabilities::empty())
    };

    harness.send(&session, described).await;
    let agent = harness.agent(&session).await;

    assert_eq!(agent.deployment_mode(), DeploymentMode::Supervisor);
    assert!(agent.capabilities_inferred());
    assert_eq!(
        Some(agent.agent_capabilities()),
        DeploymentMode::Supervisor.inferred_capabilities()
    );
    assert_eq!(agent.name(), Some("edge-collector"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn remote_config_waits_for_the_accepts_bit(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;
    let deployment = harness.deploy().await;

    let withheld = harness
        .send(&session, message(&session, 1, AgentCapabilities::REPORTS_STATUS))
        .await;
    let delivered = harness
        .send(&session, message(&session, 2, AgentCapabilities::ACCEPTS_REMOTE_CONFIG))
        .await;

    assert!(withheld.remote_config.is_none());
    let remote = delivered.remote_config.expect("config is offered");
    assert_eq!(remote.config_hash, deployment.hash().as_bytes());
    let files = remote.config.expect("config map is set").config_map;
    assert_eq!(
        files.get(CONFIG_FILE_NAME).map(|file| file.body.clone()),
        Some(CONFIG.as_bytes().to_vec())
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn servers_without_the_offer_bit_send_no_config() {
    let harness = Harness::build(
        ServerCapabilities::SUPPORTED.difference(ServerCapabilities::OFFERS_REMOTE_CONFIG),
    );
    let session = harness.connect("collector-1", TransportType::WebSocket).await;
    harness.deploy().await;

    let response = harness
        .send(&session, message(&session, 1, AgentCapabilities::ACCEPTS_REMOTE_CONFIG))
        .await;

    assert!(response.remote_config.is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn applied_reports_settle_the_audit(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;
    let deployment = harness.deploy().await;
    harness
        .send(&session, message(&session, 1, AgentCapabilities::ACCEPTS_REMOTE_CONFIG))
        .await;

    let report = AgentToServer {
        remote_config_status: Some(applied(deployment.hash())),
        ..message(&session, 2, AgentCapabilities::ACCEPTS_REMOTE_CONFIG)
    };
    let response = harness.send(&session, report).await;
    let audits = harness
        .deployments
        .get_audit(deployment.id())
        .await
        .expect("audit lookup succeeds");

    assert!(response.remote_config.is_none());
    assert_eq!(
        audits.iter().map(|audit| audit.status()).collect::<Vec<_>>(),
        vec![AuditStatus::Applied]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn foreign_identities_are_rejected(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;
    let spoofed = AgentToServer {
        instance_uid: b"collector-2".to_vec(),
        ..message(&session, 1, AgentCapabilities::REPORTS_STATUS)
    };

    let error = harness
        .processor
        .handle(&session, DecodedMessage::strict(spoofed))
        .await
        .expect_err("identity must match the connection");

    assert!(matches!(error, ProcessingError::IdentityMismatch { ref reported, .. } if reported == "collector-2"));
    assert_eq!(error.disposition(), Disposition::Respond);
    assert_eq!(harness.agent(&session).await.last_sequence_num(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn instance_uid_requests_are_refused(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;
    let request = AgentToServer {
        flags: u64::from(i32::from(AgentToServerFlags::RequestInstanceUid).unsigned_abs()),
        ..message(&session, 1, AgentCapabilities::REPORTS_STATUS)
    };

    let error = harness
        .processor
        .handle(&session, DecodedMessage::strict(request))
        .await
        .expect_err("identifiers are not reassigned");

    assert!(matches!(error, ProcessingError::InstanceUidRequested));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disconnect_messages_close_the_agent_without_offers(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;
    harness.deploy().await;
    let goodbye = AgentToServer {
        agent_disconnect: Some(AgentDisconnect {}),
        ..message(&session, 1, AgentCapabilities::ACCEPTS_REMOTE_CONFIG)
    };

    let response = harness.send(&session, goodbye).await;

    assert!(response.remote_config.is_none());
    assert_eq!(
        harness.agent(&session).await.connection_status(),
        ConnectionStatus::Disconnected
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn health_reports_are_stored(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;
    let report = AgentToServer {
        health: Some(ComponentHealth {
            healthy: false,
            status: "degraded".to_owned(),
            last_error: "exporter queue full".to_owned(),
            component_health_map: HashMap::from([(
                "exporter/otlp".to_owned(),
                ComponentHealth::default(),
            )]),
            ..ComponentHealth::default()
        }),
        ..message(&session, 1, AgentCapabilities::REPORTS_HEALTH)
    };

    harness.send(&session, report).await;
    let agent = harness.agent(&session).await;
    let health = agent.reported_health().expect("health is stored");

    assert!(!health.healthy);
    assert_eq!(health.last_error.as_deref(), Some("exporter queue full"));
    assert_eq!(
        health.components,
        BTreeMap::from([("exporter/otlp".to_owned(), false)])
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn identity_only_messages_keep_stored_capabilities(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;
    harness
        .send(&session, message(&session, 1, AgentCapabilities::ACCEPTS_REMOTE_CONFIG))
        .await;

    let degraded = DecodedMessage {
        message: AgentToServer {
            instance_uid: session.principal.instance_uid.to_wire(),
            ..AgentToServer::default()
        },
        tier: DecodeTier::IdentityOnly,
    };
    harness
        .processor
        .handle(&session, degraded)
        .await
        .expect("identity-only message is processed");
    let agent = harness.agent(&session).await;

    assert_eq!(agent.agent_capabilities(), AgentCapabilities::ACCEPTS_REMOTE_CONFIG);
    assert!(agent.full_state_requested());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn packages_are_offered_and_settled(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;
    let offer = harness
        .distribution
        .publish_package(PublishPackageRequest::new(
            harness.org_id,
            "otelcol",
            "0.110.0",
            "https://packages.example.com/otelcol-0.110.0.tar.gz",
            ConfigHash::of(b"otelcol-0.110.0"),
        ))
        .await
        .expect("package is published");
    let accepts = AgentCapabilities::ACCEPTS_PACKAGES | AgentCapabilities::REPORTS_PACKAGE_STATUSES;

    let offered = harness.send(&session, message(&session, 1, accepts)).await;
    let report = AgentToServer {
        package_statuses: Some(PackageStatuses {
            packages: HashMap::from([(
                "otelcol".to_owned(),
                proto::PackageStatus {
                    name: "otelcol".to_owned(),
                    server_offered_hash: offer.hash().as_bytes().to_vec(),
                    status: PackageStatusEnum::Installed.into(),
                    ..proto::PackageStatus::default()
                },
            )]),
            ..PackageStatuses::default()
        }),
        ..message(&session, 2, accepts)
    };
    let settled = harness.send(&session, report).await;
    let records = harness
        .distribution
        .package_records(session.agent_id)
        .await
        .expect("records load");

    let available = offered.packages_available.expect("packages are offered");
    assert_eq!(
        available.packages.get("otelcol").map(|package| package.version.clone()),
        Some("0.110.0".to_owned())
    );
    assert!(settled.packages_available.is_none());
    assert_eq!(
        records.iter().map(|record| record.status()).collect::<Vec<_>>(),
        vec![PackageStatus::Installed]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn connection_settings_need_the_accepts_bit(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;
    let offer = ConnectionSettingsOffer::new(
        harness.org_id,
        Some("wss://fleet.example.com/v1/opamp".to_owned()),
        45,
        BTreeMap::new(),
    )
    .expect("offer is valid");
    harness
        .distribution
        .publish_connection_settings(&offer)
        .await
        .expect("settings are published");

    let withheld = harness
        .send(&session, message(&session, 1, AgentCapabilities::REPORTS_STATUS))
        .await;
    let offered = harness
        .send(
            &session,
            message(&session, 2, AgentCapabilities::ACCEPTS_OPAMP_CONNECTION_SETTINGS),
        )
        .await;

    assert!(withheld.connection_settings.is_none());
    let settings = offered.connection_settings.expect("settings are offered");
    assert_eq!(settings.hash, offer.hash().as_bytes());
    assert_eq!(
        settings.opamp.map(|opamp| opamp.heartbeat_interval_seconds),
        Some(45)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn polling_reuses_the_connection(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::HttpPoll).await;
    harness
        .send(&session, message(&session, 3, AgentCapabilities::REPORTS_STATUS))
        .await;
    let agent = harness.agent(&session).await;

    let next_poll = harness
        .processor
        .open_session(harness.principal(&agent), TransportType::HttpPoll)
        .await
        .expect("poll session opens");

    assert_eq!(next_poll.agent_id, session.agent_id);
    assert_eq!(harness.agent(&session).await.last_sequence_num(), 3);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn closing_a_session_marks_the_agent_disconnected(harness: Harness) {
    let session = harness.connect("collector-1", TransportType::WebSocket).await;

    harness
        .processor
        .close_session(&session)
        .await
        .expect("session closes");

    assert_eq!(
        harness.agent(&session).await.connection_status(),
        ConnectionStatus::Disconnected
    );
}
