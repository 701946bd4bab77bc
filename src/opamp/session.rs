//! Authenticated connection identity and the protocol handling port.

use super::codec::DecodedMessage;
use super::error::ProcessingResult;
use super::proto::ServerToAgent;
use crate::agent::domain::{AgentId, InstanceUid, OrgId, TransportType};
use async_trait::async_trait;

/// Identity a credential resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    /// Organisation the agent belongs to.
    pub org_id: OrgId,
    /// Stable instance identifier.
    pub instance_uid: InstanceUid,
}

/// An open protocol session with a resolved agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Authenticated identity.
    pub principal: Principal,
    /// Directory identifier of the agent.
    pub agent_id: AgentId,
    /// Channel kind.
    pub transport: TransportType,
}

/// Protocol handling as seen by the transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Resolves the principal to a registered agent and marks it
    /// connected.
    async fn open_session(
        &self,
        principal: Principal,
        transport: TransportType,
    ) -> ProcessingResult<Session>;

    /// Processes one inbound message and builds the response.
    async fn handle(
        &self,
        session: &Session,
        message: DecodedMessage,
    ) -> ProcessingResult<ServerToAgent>;

    /// Marks the session's agent disconnected.
    async fn close_session(&self, session: &Session) -> ProcessingResult<()>;
}
