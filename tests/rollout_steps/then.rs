//! Then steps for configuration rollout BDD scenarios.

use super::world::{RolloutWorld, run_async};
use fleetplane::rollout::services::DeploymentServiceError;
use rstest_bdd_macros::then;

#[then(r#"the deployment is "{status}""#)]
fn deployment_status_is(world: &mut RolloutWorld, status: String) -> Result<(), eyre::Report> {
    let deployment_id = world.deployment()?.id();
    let report = run_async(world.plane.deployments().get_status(deployment_id))
        .map_err(|err| eyre::eyre!("get_status failed: {err}"))?;
    let actual = report.deployment.status().as_str();
    if actual != status {
        return Err(eyre::eyre!("expected deployment {status}, found {actual}"));
    }
    Ok(())
}

#[then("the rollout targets {count:usize} of the agents")]
fn rollout_targets(world: &mut RolloutWorld, count: usize) -> Result<(), eyre::Report> {
    let deployment_id = world.deployment()?.id();
    let audits = run_async(world.plane.deployments().get_audit(deployment_id))
        .map_err(|err| eyre::eyre!("get_audit failed: {err}"))?;
    if audits.len() != count {
        return Err(eyre::eyre!(
            "expected {count} targeted agents, found {}",
            audits.len()
        ));
    }
    Ok(())
}

#[then("the advance is blocked by the health gate")]
fn advance_blocked(world: &RolloutWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_advance
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing advance result in scenario world"))?;
    match result {
        Err(DeploymentServiceError::HealthGateFailed(report)) if !report.passed => Ok(()),
        other => Err(eyre::eyre!("expected a health gate failure, got {other:?}")),
    }
}

#[then("{count:usize} deliveries were withdrawn")]
fn deliveries_withdrawn(world: &RolloutWorld, count: usize) -> Result<(), eyre::Report> {
    let summary = world
        .last_rollback
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing rollback summary in scenario world"))?;
    if summary.withdrawn != count {
        return Err(eyre::eyre!(
            "expected {count} withdrawn deliveries, found {}",
            summary.withdrawn
        ));
    }
    Ok(())
}
