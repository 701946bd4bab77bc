//! Adapter implementations for deployment persistence.

pub mod memory;
pub mod postgres;
