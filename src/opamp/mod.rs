//! OpAMP wire handling and the per-message state machine.
//!
//! The transport hands every inbound frame body to
//! [`codec::decode_agent_message`], then to a [`session::ProtocolHandler`].
//! [`processor::MessageProcessor`] is the production handler: it updates
//! the agent record, settles audit and distribution reports, and builds a
//! single [`proto::ServerToAgent`] reply gated on negotiated capabilities.

pub mod codec;
mod convert;
pub mod error;
pub mod processor;
pub mod proto;
pub mod session;

pub use codec::{DecodeFailure, DecodeTier, DecodedMessage, FrameError, decode_agent_message};
pub use error::{Disposition, ProcessingError, ProcessingResult, RETRY_AFTER};
pub use processor::MessageProcessor;
pub use session::{Principal, ProtocolHandler, Session};

#[cfg(test)]
pub use session::MockProtocolHandler;

#[cfg(test)]
mod tests;
