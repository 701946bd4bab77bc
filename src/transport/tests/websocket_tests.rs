//! Tests for channel open and teardown ordering.

use super::principal;
use crate::agent::domain::{AgentId, OrgId, TransportType};
use crate::opamp::proto::ServerToAgent;
use crate::opamp::{DecodedMessage, Principal, ProcessingResult, ProtocolHandler, Session};
use crate::transport::auth::StaticTokenAuthenticator;
use crate::transport::server::TransportState;
use crate::transport::websocket::{Teardown, connect, teardown};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// Handler whose `open_session` marks the agent connected and then waits
/// for a permit before returning.
struct GatedHandler {
    connected: AtomicBool,
    entered: Notify,
    gate: Semaphore,
}

impl Default for GatedHandler {
    fn default() -> Self {
        Self {
            connected: AtomicBool::default(),
            entered: Notify::default(),
            gate: Semaphore::new(0),
        }
    }
}

#[async_trait]
impl ProtocolHandler for GatedHandler {
    async fn open_session(
        &self,
        principal: Principal,
        transport: TransportType,
    ) -> ProcessingResult<Session> {
        self.connected.store(true, Ordering::SeqCst);
        self.entered.notify_one();
        self.gate.acquire().await.expect("gate stays open").forget();
        Ok(Session {
            principal,
            agent_id: AgentId::new(),
            transport,
        })
    }

    async fn handle(
        &self,
        _session: &Session,
        _message: DecodedMessage,
    ) -> ProcessingResult<ServerToAgent> {
        Ok(ServerToAgent::default())
    }

    async fn close_session(&self, _session: &Session) -> ProcessingResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn closing_channel_does_not_disconnect_a_reconnecting_agent() {
    let handler = Arc::new(GatedHandler::default());
    let state = TransportState::new(
        Arc::clone(&handler) as Arc<dyn ProtocolHandler>,
        Arc::new(StaticTokenAuthenticator::new()),
    );
    let agent = principal(OrgId::new(), "collector-1");
    handler.gate.add_permits(1);
    let (old_session, old_channel) = connect(&state, &agent).await.expect("first channel opens");

    let reconnect = {
        let state = state.clone();
        let agent = agent.clone();
        tokio::spawn(async move { connect(&state, &agent).await })
    };
    handler.entered.notified().await;
    let closing = {
        let state = state.clone();
        tokio::spawn(async move {
            teardown(&state, &old_session, &old_channel, Teardown::ClientClosed).await;
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    handler.gate.add_permits(1);
    let (_session, _channel) = reconnect
        .await
        .expect("task joins")
        .expect("second channel opens");
    closing.await.expect("task joins");

    assert!(handler.connected.load(Ordering::SeqCst));
    assert!(state.registry().is_connected(&agent));
}
