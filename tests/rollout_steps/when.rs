//! When steps for configuration rollout BDD scenarios.

use super::world::{CONFIG, RolloutWorld, run_async};
use eyre::WrapErr;
use fleetplane::opamp::proto::RemoteConfigStatuses;
use fleetplane::rollout::domain::RolloutStrategy;
use fleetplane::rollout::services::{CreateDeploymentRequest, HealthGate};
use rstest_bdd_macros::when;

fn deploy(
    world: &mut RolloutWorld,
    tag: &str,
    strategy: RolloutStrategy,
) -> Result<(), eyre::Report> {
    let request = CreateDeploymentRequest::new(world.org_id, "scenario-pipeline", CONFIG)
        .with_strategy(strategy)
        .with_target_tags([tag]);
    let deployment = run_async(world.plane.deployments().create_deployment(request))
        .wrap_err("create deployment for scenario")?;
    world.deployment = Some(deployment);
    Ok(())
}

#[when(r#"a configuration is deployed immediately to "{tag}""#)]
fn deployed_immediately(world: &mut RolloutWorld, tag: String) -> Result<(), eyre::Report> {
    deploy(world, &tag, RolloutStrategy::Immediate)
}

#[when(r#"a configuration is deployed as a {percentage:u8} percent canary to "{tag}""#)]
fn deployed_as_canary(
    world: &mut RolloutWorld,
    percentage: u8,
    tag: String,
) -> Result<(), eyre::Report> {
    let strategy = RolloutStrategy::canary(percentage).wrap_err("build canary strategy")?;
    deploy(world, &tag, strategy)
}

#[when("every targeted agent reports the configuration {outcome}")]
fn targeted_agents_report(world: &mut RolloutWorld, outcome: String) -> Result<(), eyre::Report> {
    let status = match outcome.as_str() {
        "applied" => RemoteConfigStatuses::Applied,
        "failed" => RemoteConfigStatuses::Failed,
        other => return Err(eyre::eyre!("unknown report outcome '{other}'")),
    };
    let deployment_id = world.deployment()?.id();
    let audits = run_async(world.plane.deployments().get_audit(deployment_id))
        .wrap_err("load audit rows")?;
    for audit in audits {
        let agent = world
            .agents
            .iter()
            .find(|agent| agent.id() == audit.agent_id())
            .ok_or_else(|| eyre::eyre!("audit row names an unknown agent"))?;
        run_async(world.report_outcome(agent, status))?;
    }
    Ok(())
}

#[when("the rollout is advanced with a {percent:u8} percent health gate")]
fn advance_with_gate(world: &mut RolloutWorld, percent: u8) -> Result<(), eyre::Report> {
    let deployment_id = world.deployment()?.id();
    let result = run_async(
        world
            .plane
            .deployments()
            .advance_stage(deployment_id, Some(HealthGate::new(percent))),
    );
    world.last_advance = Some(result);
    Ok(())
}

#[when("the deployment is rolled back")]
fn roll_back(world: &mut RolloutWorld) -> Result<(), eyre::Report> {
    let deployment_id = world.deployment()?.id();
    let summary = run_async(world.plane.deployments().rollback(deployment_id))
        .map_err(|err| eyre::eyre!("rollback failed: {err}"))?;
    world.last_rollback = Some(summary);
    Ok(())
}
