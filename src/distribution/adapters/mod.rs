//! Adapter implementations for distribution ports.

pub mod memory;
