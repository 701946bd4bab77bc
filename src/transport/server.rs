//! Shared transport state, the router, and per-message exchange.

use super::auth::{AgentAuthenticator, AuthError, bearer_token};
use super::registry::ConnectionRegistry;
use super::{http, websocket};
use crate::opamp::proto::ServerToAgent;
use crate::opamp::{Disposition, Principal, ProtocolHandler, Session, decode_agent_message};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Path serving both the WebSocket upgrade and the HTTP fallback.
pub const OPAMP_PATH: &str = "/v1/opamp";

/// Interval between server-initiated WebSocket pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default cap on an inbound frame or request body.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Everything a connection task needs.
#[derive(Clone)]
pub struct TransportState {
    pub(super) handler: Arc<dyn ProtocolHandler>,
    authenticator: Arc<dyn AgentAuthenticator>,
    pub(super) registry: ConnectionRegistry,
    pub(super) max_frame_bytes: usize,
    pub(super) ping_interval: Duration,
}

impl TransportState {
    /// Creates transport state with default limits.
    #[must_use]
    pub fn new(
        handler: Arc<dyn ProtocolHandler>,
        authenticator: Arc<dyn AgentAuthenticator>,
    ) -> Self {
        Self {
            handler,
            authenticator,
            registry: ConnectionRegistry::new(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            ping_interval: PING_INTERVAL,
        }
    }

    /// Caps inbound frames and request bodies.
    #[must_use]
    pub const fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Overrides the WebSocket ping interval.
    #[must_use]
    pub const fn with_ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }

    /// Live channel registry.
    #[must_use]
    pub const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub(super) async fn authenticate(
        &self,
        headers: &HeaderMap,
        query: &CredentialQuery,
    ) -> Result<Principal, AuthError> {
        let token = bearer_token(headers, query.token.as_deref()).ok_or(AuthError::MissingCredential)?;
        self.authenticator.authenticate(token).await
    }
}

/// Query parameters accepted on the OpAMP path.
#[derive(Debug, Default, Deserialize)]
pub(super) struct CredentialQuery {
    token: Option<String>,
}

/// Builds the OpAMP router.
#[must_use]
pub fn router(state: TransportState) -> Router {
    let limit = state.max_frame_bytes;
    Router::new()
        .route(OPAMP_PATH, get(websocket::upgrade).post(http::exchange))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Answer to one inbound message.
pub(super) struct Reply {
    pub response: ServerToAgent,
    pub disposition: Disposition,
}

/// Decodes a message body and runs it through the handler.
///
/// Processing failures become error responses; the disposition says
/// whether the channel survives.
pub(super) async fn process_body(
    handler: &dyn ProtocolHandler,
    session: &Session,
    body: &[u8],
) -> Reply {
    let outcome = match decode_agent_message(body) {
        Ok(decoded) => handler.handle(session, decoded).await,
        Err(failure) => Err(failure.into()),
    };
    match outcome {
        Ok(response) => Reply {
            response,
            disposition: Disposition::Respond,
        },
        Err(err) => {
            if err.is_store_failure() {
                error!(agent_id = %session.agent_id, error = %err, "store failure while processing agent message");
            } else {
                warn!(agent_id = %session.agent_id, error = %err, "agent message rejected");
            }
            Reply {
                response: err.to_response(session.principal.instance_uid.to_wire()),
                disposition: err.disposition(),
            }
        }
    }
}

/// Maps a failed handshake to an HTTP response.
pub(super) fn reject(err: &AuthError) -> Response {
    warn!(error = %err, "agent handshake rejected");
    let status = match err {
        AuthError::MissingCredential | AuthError::InvalidCredential => StatusCode::UNAUTHORIZED,
        AuthError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, err.to_string()).into_response()
}
