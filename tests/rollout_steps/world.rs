//! Shared world state for configuration rollout BDD scenarios.

use fleetplane::agent::domain::{Agent, OrgId, TransportType};
use fleetplane::app::InMemoryControlPlane;
use fleetplane::capability::{AgentCapabilities, ServerCapabilities};
use fleetplane::opamp::proto::{AgentToServer, RemoteConfigStatus, RemoteConfigStatuses};
use fleetplane::opamp::{DecodedMessage, Principal};
use fleetplane::rollout::domain::ConfigDeployment;
use fleetplane::rollout::services::{DeploymentServiceError, RollbackSummary, StageAdvance};
use rstest::fixture;

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
    metrics:
      receivers: [otlp]
      processors: [batch]
      exporters: [debug]
";

/// Scenario world for rollout behaviour tests.
pub struct RolloutWorld {
    /// Control plane under test.
    pub plane: InMemoryControlPlane,
    /// Organisation owning every agent.
    pub org_id: OrgId,
    /// Registered agents.
    pub agents: Vec<Agent>,
    /// Deployment created by the scenario.
    pub deployment: Option<ConfigDeployment>,
    /// Result of the last stage advance.
    pub last_advance: Option<Result<StageAdvance, DeploymentServiceError>>,
    /// Result of the last rollback.
    pub last_rollback: Option<RollbackSummary>,
}

impl RolloutWorld {
    /// Creates a world with an empty in-memory control plane.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plane: InMemoryControlPlane::in_memory(ServerCapabilities::SUPPORTED),
            org_id: OrgId::new(),
            agents: Vec::new(),
            deployment: None,
            last_advance: None,
            last_rollback: None,
        }
    }

    /// Returns the scenario deployment.
    pub fn deployment(&self) -> Result<&ConfigDeployment, eyre::Report> {
        self.deployment
            .as_ref()
            .ok_or_else(|| eyre::eyre!("no deployment in scenario world"))
    }

    /// Connects `agent`, collects its pending configuration, and reports
    /// `status` for the deployment.
    pub async fn report_outcome(
        &self,
        agent: &Agent,
        status: RemoteConfigStatuses,
    ) -> Result<(), eyre::Report> {
        let deployment = self.deployment()?;
        let handler = self.plane.handler();
        let session = handler
            .open_session(
                Principal {
                    org_id: agent.org_id(),
                    instance_uid: agent.instance_uid().clone(),
                },
                TransportType::WebSocket,
            )
            .await
            .map_err(|err| eyre::eyre!("open_session failed: {err}"))?;
        let base = AgentToServer {
            instance_uid: agent.instance_uid().to_wire(),
            capabilities: AgentCapabilities::ACCEPTS_REMOTE_CONFIG.encode(),
            ..AgentToServer::default()
        };
        let offered = handler
            .handle(
                &session,
                DecodedMessage::strict(AgentToServer {
                    sequence_num: 1,
                    ..base.clone()
                }),
            )
            .await
            .map_err(|err| eyre::eyre!("claim exchange failed: {err}"))?;
        if offered.remote_config.is_none() {
            return Err(eyre::eyre!(
                "agent {} was offered no configuration",
                agent.instance_uid()
            ));
        }
        let error_message = if status == RemoteConfigStatuses::Failed {
            "exporter rejected endpoint".to_owned()
        } else {
            String::new()
        };
        handler
            .handle(
                &session,
                DecodedMessage::strict(AgentToServer {
                    sequence_num: 2,
                    remote_config_status: Some(RemoteConfigStatus {
                        last_remote_config_hash: deployment.hash().as_bytes().to_vec(),
                        status: status.into(),
                        error_message,
                    }),
                    ..base
                }),
            )
            .await
            .map_err(|err| eyre::eyre!("report exchange failed: {err}"))?;
        Ok(())
    }
}

impl Default for RolloutWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> RolloutWorld {
    RolloutWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
