//! Unit tests for configuration rollout.

mod postgres_mapping_tests;
mod repository_tests;
