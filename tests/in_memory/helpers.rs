//! Shared fixtures for in-memory integration tests.

use fleetplane::agent::domain::{Agent, OrgId};
use fleetplane::app::InMemoryControlPlane;
use fleetplane::capability::{AgentCapabilities, ServerCapabilities};
use fleetplane::config::EnrollmentFile;
use fleetplane::opamp::proto::AgentToServer;
use rstest::fixture;
use uuid::Uuid;

/// Organisation every enrolled agent belongs to.
pub const ORG: &str = "7b0c1d2e-3f40-4a5b-8c6d-7e8f9a0b1c2d";

/// A collector configuration the validator accepts.
pub const CONFIG: &str = "\
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

/// Enrollment with one edge supervisor and one gateway collector.
pub fn enrollment() -> EnrollmentFile {
    let yaml = format!(
        "agents:
  - token: edge-token
    org_id: {ORG}
    instance_uid: edge-01
    name: edge collector
    tags: [edge, eu-west]
    deployment_mode: supervisor
  - token: gateway-token
    org_id: {ORG}
    instance_uid: gateway-01
    tags: [gateway]
"
    );
    EnrollmentFile::parse(&yaml).expect("enrollment parses")
}

/// The organisation of [`ORG`].
pub fn org_id() -> OrgId {
    OrgId::from_uuid(Uuid::parse_str(ORG).expect("valid organisation id"))
}

/// Fresh in-memory control plane offering every capability.
#[fixture]
pub fn plane() -> InMemoryControlPlane {
    InMemoryControlPlane::in_memory(ServerCapabilities::SUPPORTED)
}

/// Registers the enrollment and returns the agents in file order.
pub async fn enroll(plane: &InMemoryControlPlane) -> Vec<Agent> {
    plane
        .enroll(&enrollment())
        .await
        .expect("enrollment registers")
}

/// A minimal status report from `uid`.
pub fn report(uid: &str, sequence_num: u64, capabilities: AgentCapabilities) -> AgentToServer {
    AgentToServer {
        instance_uid: uid.as_bytes().to_vec(),
        sequence_num,
        capabilities: capabilities.encode(),
        ..AgentToServer::default()
    }
}
