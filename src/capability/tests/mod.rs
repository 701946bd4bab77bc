//! Unit tests for the capability codec.

mod codec_tests;
