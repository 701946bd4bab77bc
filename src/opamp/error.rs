//! Protocol processing errors and how each is answered.

use super::codec::DecodeFailure;
use super::proto::{RetryInfo, ServerErrorResponse, ServerErrorResponseType, ServerToAgent, server_error_response};
use crate::agent::domain::{InstanceUid, OrgId};
use crate::agent::services::AgentDirectoryError;
use crate::distribution::services::DistributionError;
use crate::rollout::services::DeploymentServiceError;
use std::time::Duration;
use thiserror::Error;

/// Back-off suggested to agents when the server cannot process a message.
pub const RETRY_AFTER: Duration = Duration::from_secs(30);

/// What the transport does after a processing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Send the error response and keep reading.
    Respond,
    /// Send the error response and close the connection.
    Close,
}

/// Failure to process one agent message.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The credential names an agent that is not registered.
    #[error("agent {instance_uid} is not registered in organisation {org_id}")]
    UnknownAgent {
        /// Organisation from the credential.
        org_id: OrgId,
        /// Instance identifier from the credential.
        instance_uid: InstanceUid,
    },
    /// The message body names another instance.
    #[error("message names instance {reported}; connection belongs to {expected}")]
    IdentityMismatch {
        /// Identity bound to the connection.
        expected: InstanceUid,
        /// Identity found in the message.
        reported: String,
    },
    /// The agent asked the server to assign a new identifier.
    #[error("instance identifiers are bound to enrollment credentials and cannot be reassigned")]
    InstanceUidRequested,
    /// Nothing could be recovered from the message.
    #[error(transparent)]
    Undecodable(#[from] DecodeFailure),
    /// Agent directory operation failed.
    #[error(transparent)]
    Directory(#[from] AgentDirectoryError),
    /// Deployment operation failed.
    #[error(transparent)]
    Deployment(#[from] DeploymentServiceError),
    /// Package or settings operation failed.
    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

impl ProcessingError {
    /// Returns `true` when a backing store itself failed.
    #[must_use]
    pub const fn is_store_failure(&self) -> bool {
        match self {
            Self::Directory(err) => err.is_store_failure(),
            Self::Deployment(err) => err.is_store_failure(),
            Self::Distribution(err) => err.is_store_failure(),
            _ => false,
        }
    }

    /// Returns whether the connection survives this error.
    ///
    /// Unknown agents and store outages close the connection; the agent
    /// reconnects and is resolved afresh.
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        if matches!(self, Self::UnknownAgent { .. }) || self.is_store_failure() {
            Disposition::Close
        } else {
            Disposition::Respond
        }
    }

    /// Returns the error category reported to the agent.
    #[must_use]
    pub const fn response_type(&self) -> ServerErrorResponseType {
        match self {
            Self::UnknownAgent { .. }
            | Self::IdentityMismatch { .. }
            | Self::InstanceUidRequested
            | Self::Undecodable(_) => ServerErrorResponseType::BadRequest,
            Self::Directory(_) | Self::Deployment(_) | Self::Distribution(_) => {
                ServerErrorResponseType::Unavailable
            }
        }
    }

    /// Builds the message sent to the agent in place of a normal response.
    #[must_use]
    pub fn to_response(&self, instance_uid: Vec<u8>) -> ServerToAgent {
        let kind = self.response_type();
        let details = (kind == ServerErrorResponseType::Unavailable).then(|| {
            server_error_response::Details::RetryInfo(RetryInfo {
                retry_after_nanoseconds: u64::try_from(RETRY_AFTER.as_nanos()).unwrap_or(u64::MAX),
            })
        });
        ServerToAgent {
            instance_uid,
            error_response: Some(ServerErrorResponse {
                r#type: kind.into(),
                error_message: self.to_string(),
                details,
            }),
            ..ServerToAgent::default()
        }
    }
}

/// Result type for protocol processing.
pub type ProcessingResult<T> = Result<T, ProcessingError>;
