//! Unit tests for OpAMP decoding and message processing.

mod codec_tests;
mod error_tests;
mod processor_tests;
