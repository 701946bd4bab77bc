//! WebSocket round trips against a bound server.

use super::helpers::{enroll, enrollment, plane, report};
use fleetplane::agent::domain::ConnectionStatus;
use fleetplane::app::InMemoryControlPlane;
use fleetplane::capability::{AgentCapabilities, ServerCapabilities};
use fleetplane::opamp::codec::strip_ws_header;
use fleetplane::opamp::proto::{AgentToServer, ServerToAgent};
use fleetplane::transport::{OPAMP_PATH, TransportState, router};
use futures_util::{SinkExt, StreamExt};
use prost::Message as _;
use rstest::rstest;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(plane: &InMemoryControlPlane) -> SocketAddr {
    let state = TransportState::new(plane.handler(), Arc::new(enrollment().authenticator()));
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener binds");
    let addr = listener.local_addr().expect("listener has an address");
    tokio::spawn(async move { axum::serve(listener, router(state)).await });
    addr
}

async fn dial(addr: SocketAddr, token: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}{OPAMP_PATH}?token={token}"))
        .await
        .expect("upgrade succeeds");
    client
}

fn frame(message: &AgentToServer) -> Vec<u8> {
    let mut frame = vec![0];
    frame.extend_from_slice(&message.encode_to_vec());
    frame
}

async fn round_trip(client: &mut Client, message: &AgentToServer) -> ServerToAgent {
    client
        .send(Message::Binary(frame(message).into()))
        .await
        .expect("frame is sent");
    loop {
        let inbound = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("reply arrives in time")
            .expect("channel stays open")
            .expect("frame is readable");
        if let Message::Binary(bytes) = inbound {
            let body = strip_ws_header(&bytes).expect("reply has a header");
            return ServerToAgent::decode(body).expect("reply decodes");
        }
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn authenticated_agents_exchange_messages(plane: InMemoryControlPlane) {
    let agents = enroll(&plane).await;
    let addr = serve(&plane).await;
    let mut client = dial(addr, "edge-token").await;

    let reply = round_trip(
        &mut client,
        &report("edge-01", 1, AgentCapabilities::REPORTS_STATUS),
    )
    .await;
    let edge = plane
        .directory()
        .find(agents.first().expect("edge agent enrolled").id())
        .await
        .expect("lookup succeeds")
        .expect("agent exists");

    assert_eq!(reply.instance_uid, b"edge-01".to_vec());
    assert_eq!(reply.capabilities, ServerCapabilities::SUPPORTED.encode());
    assert_eq!(edge.connection_status(), ConnectionStatus::Connected);
    assert_eq!(edge.last_sequence_num(), 1);
}

#[rstest]
#[case::missing("")]
#[case::unknown("not-enrolled")]
#[tokio::test(flavor = "multi_thread")]
async fn upgrades_without_a_valid_token_are_refused(
    plane: InMemoryControlPlane,
    #[case] token: &str,
) {
    enroll(&plane).await;
    let addr = serve(&plane).await;

    let result = connect_async(format!("ws://{addr}{OPAMP_PATH}?token={token}")).await;

    assert!(result.is_err());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn a_second_connection_supersedes_the_first(plane: InMemoryControlPlane) {
    enroll(&plane).await;
    let addr = serve(&plane).await;
    let mut first = dial(addr, "gateway-token").await;
    round_trip(
        &mut first,
        &report("gateway-01", 1, AgentCapabilities::REPORTS_STATUS),
    )
    .await;

    let mut second = dial(addr, "gateway-token").await;
    let closed = tokio::time::timeout(Duration::from_secs(5), first.next())
        .await
        .expect("first channel is closed in time");
    let reply = round_trip(
        &mut second,
        &report("gateway-01", 1, AgentCapabilities::REPORTS_STATUS),
    )
    .await;

    assert!(matches!(closed, None | Some(Ok(Message::Close(_)) | Err(_))));
    assert_eq!(reply.instance_uid, b"gateway-01".to_vec());
}
