//! Default validation rule set.

mod rules;
pub mod service;

pub use service::DefaultConfigValidator;
