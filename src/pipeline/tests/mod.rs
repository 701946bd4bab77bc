//! Unit tests for configuration validation.

mod hash_tests;
mod validator_tests;
