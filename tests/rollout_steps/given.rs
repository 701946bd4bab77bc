//! Given steps for configuration rollout BDD scenarios.

use super::world::{RolloutWorld, run_async};
use eyre::WrapErr;
use fleetplane::agent::services::RegisterAgentRequest;
use rstest_bdd_macros::given;

#[given(r#"{count:usize} agents tagged "{tag}""#)]
fn agents_tagged(world: &mut RolloutWorld, count: usize, tag: String) -> Result<(), eyre::Report> {
    for index in 0..count {
        let request = RegisterAgentRequest::new(world.org_id, format!("collector-{index:02}"))
            .with_tags([tag.as_str()]);
        let agent = run_async(world.plane.directory().register(request))
            .wrap_err("register agent for scenario")?;
        world.agents.push(agent);
    }
    Ok(())
}
