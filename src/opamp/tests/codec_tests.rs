//! Tests for frame handling and tiered decoding.

use crate::opamp::codec::{
    DecodeTier, FrameError, WS_HEADER, decode_agent_message, encode_ws_frame, strip_ws_header,
};
use crate::opamp::proto::{AgentToServer, ComponentHealth, ServerToAgent};
use prost::Message;
use rstest::{fixture, rstest};

const UID: &[u8] = b"collector-7";

#[fixture]
fn message() -> AgentToServer {
    AgentToServer {
        instance_uid: UID.to_vec(),
        sequence_num: 4,
        capabilities: 0x03,
        health: Some(ComponentHealth {
            healthy: true,
            status: "running".to_owned(),
            ..ComponentHealth::default()
        }),
        ..AgentToServer::default()
    }
}

#[rstest]
fn well_formed_messages_decode_strictly(message: AgentToServer) {
    let decoded = decode_agent_message(&message.encode_to_vec()).expect("message decodes");

    assert_eq!(decoded.tier, DecodeTier::Strict);
    assert!(!decoded.tier.is_degraded());
    assert_eq!(decoded.message, message);
}

#[rstest]
fn a_corrupt_sub_message_is_dropped(message: AgentToServer) {
    let mut body = message.encode_to_vec();
    // Field 3 (agent_description) whose inner field claims 127 bytes.
    body.extend_from_slice(&[0x1A, 0x02, 0x0A, 0x7F]);

    let decoded = decode_agent_message(&body).expect("lenient decode succeeds");

    assert_eq!(
        decoded.tier,
        DecodeTier::Lenient {
            dropped: vec!["agent_description"]
        }
    );
    assert_eq!(decoded.tier.label(), "lenient");
    assert_eq!(decoded.message.instance_uid, UID);
    assert_eq!(decoded.message.sequence_num, 4);
    assert_eq!(decoded.message.health, message.health);
    assert!(decoded.message.agent_description.is_none());
}

#[rstest]
fn a_truncated_tail_keeps_the_identity(message: AgentToServer) {
    let mut body = message.encode_to_vec();
    // Field 8 (package_statuses) claiming 50 bytes with only two present.
    body.extend_from_slice(&[0x42, 0x32, 0x0A, 0x01]);

    let decoded = decode_agent_message(&body).expect("identity survives");

    assert_eq!(decoded.tier, DecodeTier::IdentityOnly);
    assert!(decoded.tier.is_degraded());
    assert_eq!(decoded.message.instance_uid, UID);
    assert_eq!(decoded.message.sequence_num, 0);
    assert!(decoded.message.health.is_none());
}

#[rstest]
#[case::bad_varint(&[0xFF])]
#[case::identity_missing(&[0x10, 0x05, 0x1A, 0x09, 0x01])]
fn bodies_without_an_identity_fail(#[case] body: &[u8]) {
    let failure = decode_agent_message(body).expect_err("nothing is recoverable");

    assert!(!failure.reason.is_empty());
}

#[rstest]
fn frames_round_trip_through_the_header() {
    let response = ServerToAgent {
        instance_uid: UID.to_vec(),
        flags: 1,
        ..ServerToAgent::default()
    };

    let frame = encode_ws_frame(&response);
    let body = strip_ws_header(&frame).expect("header is accepted");

    assert_eq!(frame.first().copied(), u8::try_from(WS_HEADER).ok());
    assert_eq!(ServerToAgent::decode(body).expect("body decodes"), response);
}

#[rstest]
#[case::unsupported(&[0x01, 0x0A], FrameError::UnsupportedHeader(1))]
#[case::empty(&[], FrameError::MalformedHeader)]
#[case::unterminated(&[0x80], FrameError::MalformedHeader)]
fn bad_headers_are_rejected(#[case] frame: &[u8], #[case] expected: FrameError) {
    assert_eq!(strip_ws_header(frame), Err(expected));
}
