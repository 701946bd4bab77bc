//! Frame handling and layered decoding of agent messages.
//!
//! Decoding tries three tiers in order and stops at the first that
//! succeeds:
//!
//! 1. A strict decode of the whole message.
//! 2. A lenient decode that keeps each sub-message as raw bytes, decodes
//!    the parts one by one, and drops the ones that fail.
//! 3. An identity scan that reads fields until the instance identifier is
//!    found, tolerating a truncated or corrupt tail.
//!
//! A message that yields nothing at all is [`DecodeFailure`].

use super::proto::{AgentToServer, AgentToServerEnvelope, ServerToAgent};
use prost::Message;
use prost::bytes::Buf;
use prost::encoding::{DecodeContext, WireType, decode_key, decode_varint, encode_varint, skip_field};
use thiserror::Error;
use tracing::warn;

/// Value of the WebSocket frame header this server understands.
pub const WS_HEADER: u64 = 0;

const INSTANCE_UID_TAG: u32 = 1;

/// How much of a message survived decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeTier {
    /// Every field decoded.
    Strict,
    /// Some sub-messages were malformed and dropped.
    Lenient {
        /// Names of the dropped sub-messages.
        dropped: Vec<&'static str>,
    },
    /// Only the instance identifier could be read.
    IdentityOnly,
}

impl DecodeTier {
    /// Returns `true` when anything was lost.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        !matches!(self, Self::Strict)
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Lenient { .. } => "lenient",
            Self::IdentityOnly => "identity_only",
        }
    }
}

/// An agent message with the tier it was recovered at.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// The recovered message. Fields lost to decoding are absent.
    pub message: AgentToServer,
    /// Decode tier reached.
    pub tier: DecodeTier,
}

impl DecodedMessage {
    /// Wraps a message that decoded in full.
    #[must_use]
    pub const fn strict(message: AgentToServer) -> Self {
        Self {
            message,
            tier: DecodeTier::Strict,
        }
    }
}

/// Nothing, not even the instance identifier, could be read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("undecodable agent message: {reason}")]
pub struct DecodeFailure {
    /// Why the strict decode failed.
    pub reason: String,
}

/// A WebSocket frame could not be split into header and body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The header varint was missing or malformed.
    #[error("frame header is not a valid varint")]
    MalformedHeader,
    /// The header names an encoding this server does not speak.
    #[error("unsupported frame header {0}")]
    UnsupportedHeader(u64),
}

/// Splits the OpAMP header off a binary WebSocket frame.
///
/// # Errors
///
/// Returns [`FrameError`] when the header is malformed or not
/// [`WS_HEADER`].
pub fn strip_ws_header(frame: &[u8]) -> Result<&[u8], FrameError> {
    let mut body = frame;
    let header = decode_varint(&mut body).map_err(|_| FrameError::MalformedHeader)?;
    if header != WS_HEADER {
        return Err(FrameError::UnsupportedHeader(header));
    }
    Ok(body)
}

/// Encodes a server message as a WebSocket frame body with its header.
#[must_use]
pub fn encode_ws_frame(message: &ServerToAgent) -> Vec<u8> {
    let mut frame = Vec::with_capacity(message.encoded_len().saturating_add(1));
    encode_varint(WS_HEADER, &mut frame);
    frame.extend_from_slice(&message.encode_to_vec());
    frame
}

/// Decodes an agent message body, falling back tier by tier.
///
/// # Errors
///
/// Returns [`DecodeFailure`] when no tier recovers the instance
/// identifier.
pub fn decode_agent_message(body: &[u8]) -> Result<DecodedMessage, DecodeFailure> {
    let strict_error = match AgentToServer::decode(body) {
        Ok(message) => return Ok(DecodedMessage::strict(message)),
        Err(err) => err,
    };

    if let Ok(envelope) = AgentToServerEnvelope::decode(body) {
        let (message, dropped) = from_envelope(envelope);
        warn!(tier = "lenient", ?dropped, error = %strict_error, "agent message partly decoded");
        return Ok(DecodedMessage {
            message,
            tier: DecodeTier::Lenient { dropped },
        });
    }

    match scan_instance_uid(body) {
        Some(instance_uid) => {
            warn!(tier = "identity_only", error = %strict_error, "agent message reduced to its identity");
            Ok(DecodedMessage {
                message: AgentToServer {
                    instance_uid,
                    ..AgentToServer::default()
                },
                tier: DecodeTier::IdentityOnly,
            })
        }
        None => Err(DecodeFailure {
            reason: strict_error.to_string(),
        }),
    }
}

fn from_envelope(envelope: AgentToServerEnvelope) -> (AgentToServer, Vec<&'static str>) {
    let mut dropped = Vec::new();
    let message = AgentToServer {
        instance_uid: envelope.instance_uid,
        sequence_num: envelope.sequence_num,
        agent_description: part(envelope.agent_description, "agent_description", &mut dropped),
        capabilities: envelope.capabilities,
        health: part(envelope.health, "health", &mut dropped),
        effective_config: part(envelope.effective_config, "effective_config", &mut dropped),
        remote_config_status: part(
            envelope.remote_config_status,
            "remote_config_status",
            &mut dropped,
        ),
        package_statuses: part(envelope.package_statuses, "package_statuses", &mut dropped),
        agent_disconnect: part(envelope.agent_disconnect, "agent_disconnect", &mut dropped),
        flags: envelope.flags,
        available_components: part(
            envelope.available_components,
            "available_components",
            &mut dropped,
        ),
        connection_settings_status: part(
            envelope.connection_settings_status,
            "connection_settings_status",
            &mut dropped,
        ),
    };
    (message, dropped)
}

fn part<M: Message + Default>(
    raw: Option<Vec<u8>>,
    name: &'static str,
    dropped: &mut Vec<&'static str>,
) -> Option<M> {
    let bytes = raw?;
    M::decode(bytes.as_slice())
        .inspect_err(|_| dropped.push(name))
        .ok()
}

/// Reads fields in order until the instance identifier is found.
fn scan_instance_uid(body: &[u8]) -> Option<Vec<u8>> {
    let mut buf = body;
    while buf.has_remaining() {
        let (tag, wire_type) = decode_key(&mut buf).ok()?;
        if tag == INSTANCE_UID_TAG && wire_type == WireType::LengthDelimited {
            let len = usize::try_from(decode_varint(&mut buf).ok()?).ok()?;
            let uid = buf.get(..len)?.to_vec();
            return (!uid.is_empty()).then_some(uid);
        }
        skip_field(wire_type, tag, &mut buf, DecodeContext::default()).ok()?;
    }
    None
}
