//! Step definitions for configuration rollout scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
