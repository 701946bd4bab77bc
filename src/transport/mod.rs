//! Agent connection transport.
//!
//! Credentials are resolved to a principal before any protocol logic
//! runs. WebSocket channels are long-lived, one per agent instance, and
//! processed strictly in order; the HTTP fallback answers one message per
//! request.

pub mod auth;
mod http;
pub mod registry;
pub mod server;
mod websocket;

pub use auth::{AgentAuthenticator, AuthError, StaticTokenAuthenticator, bearer_token};
pub use http::PROTOBUF_CONTENT_TYPE;
pub use registry::{ChannelHandle, ConnectionRegistry};
pub use server::{
    DEFAULT_MAX_FRAME_BYTES, OPAMP_PATH, PING_INTERVAL, TransportState, router,
};

#[cfg(test)]
pub use auth::MockAgentAuthenticator;

#[cfg(test)]
mod tests;
