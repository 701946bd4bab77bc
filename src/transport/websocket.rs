//! WebSocket channel loop.
//!
//! Each connection runs on its own task and handles one frame at a time:
//! the response to a frame is sent before the next frame is read.

use super::registry::ChannelHandle;
use super::server::{CredentialQuery, TransportState, process_body, reject};
use crate::agent::domain::TransportType;
use crate::opamp::codec::{encode_ws_frame, strip_ws_header};
use crate::opamp::{Disposition, Principal, ProcessingResult, Session};
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

/// Why a channel loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Teardown {
    ClientClosed,
    SocketError,
    MalformedFrame,
    ProtocolError,
    Superseded,
}

impl Teardown {
    const fn label(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::SocketError => "socket_error",
            Self::MalformedFrame => "malformed_frame",
            Self::ProtocolError => "protocol_error",
            Self::Superseded => "superseded",
        }
    }
}

pub(super) async fn upgrade(
    State(state): State<TransportState>,
    Query(query): Query<CredentialQuery>,
    headers: HeaderMap,
    socket: WebSocketUpgrade,
) -> Response {
    let principal = match state.authenticate(&headers, &query).await {
        Ok(principal) => principal,
        Err(err) => return reject(&err),
    };
    let limit = state.max_frame_bytes;
    socket
        .max_message_size(limit)
        .on_upgrade(move |upgraded| run_connection(state, upgraded, principal))
        .into_response()
}

async fn run_connection(state: TransportState, mut socket: WebSocket, principal: Principal) {
    let (session, mut channel) = match connect(&state, &principal).await {
        Ok(opened) => opened,
        Err(err) => {
            warn!(instance_uid = %principal.instance_uid, error = %err, "session refused");
            let frame = encode_ws_frame(&err.to_response(principal.instance_uid.to_wire()));
            if socket.send(Message::Binary(frame.into())).await.is_ok() {
                let _closed = socket.send(Message::Close(None)).await;
            }
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();
    let mut ping = tokio::time::interval(state.ping_interval);
    ping.tick().await;

    let reason = loop {
        tokio::select! {
            () = channel.superseded() => {
                let _closed = sender.send(Message::Close(None)).await;
                break Teardown::Superseded;
            }
            inbound = receiver.next() => {
                let message = match inbound {
                    None | Some(Ok(Message::Close(_))) => break Teardown::ClientClosed,
                    Some(Err(err)) => {
                        debug!(agent_id = %session.agent_id, error = %err, "socket read failed");
                        break Teardown::SocketError;
                    }
                    Some(Ok(message)) => message,
                };
                let frame = match message {
                    Message::Binary(frame) => frame,
                    Message::Ping(_) | Message::Pong(_) => continue,
                    Message::Text(_) | Message::Close(_) => break Teardown::MalformedFrame,
                };
                match respond(&state, &session, &frame).await {
                    Ok((reply, Disposition::Respond)) => {
                        if sender.send(Message::Binary(reply)).await.is_err() {
                            break Teardown::SocketError;
                        }
                    }
                    Ok((reply, Disposition::Close)) => {
                        let _sent = sender.send(Message::Binary(reply)).await;
                        break Teardown::ProtocolError;
                    }
                    Err(reason) => break reason,
                }
            }
            _ = ping.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break Teardown::SocketError;
                }
            }
        }
    };

    teardown(&state, &session, &channel, reason).await;
}

/// Opens the session and registers the channel under the instance's
/// lifecycle lock.
pub(super) async fn connect(
    state: &TransportState,
    principal: &Principal,
) -> ProcessingResult<(Session, ChannelHandle)> {
    let _lifecycle = state.registry.lock_lifecycle(principal).await;
    let session = state
        .handler
        .open_session(principal.clone(), TransportType::WebSocket)
        .await?;
    Ok((session, state.registry.register(principal)))
}

async fn respond(
    state: &TransportState,
    session: &Session,
    frame: &[u8],
) -> Result<(Bytes, Disposition), Teardown> {
    let body = strip_ws_header(frame).map_err(|err| {
        warn!(agent_id = %session.agent_id, error = %err, "malformed frame; closing channel");
        Teardown::MalformedFrame
    })?;
    let reply = process_body(state.handler.as_ref(), session, body).await;
    Ok((Bytes::from(encode_ws_frame(&reply.response)), reply.disposition))
}

/// Releases the channel and, when it still owned the slot, records the
/// disconnect under the instance's lifecycle lock.
pub(super) async fn teardown(
    state: &TransportState,
    session: &Session,
    channel: &ChannelHandle,
    reason: Teardown,
) {
    let _lifecycle = state.registry.lock_lifecycle(&session.principal).await;
    if state.registry.unregister(&session.principal, channel) {
        if let Err(err) = state.handler.close_session(session).await {
            warn!(agent_id = %session.agent_id, error = %err, "failed to record disconnect");
        }
    } else {
        debug!(agent_id = %session.agent_id, "superseded channel closed; agent stays connected");
    }
    info!(
        agent_id = %session.agent_id,
        instance_uid = %session.principal.instance_uid,
        reason = reason.label(),
        "channel closed"
    );
}
