//! Unit tests for package and connection-settings distribution.

mod delivery_tests;
