//! Single-shot HTTP fallback.
//!
//! Each POST carries one bare protobuf message and is answered with one
//! response. Polling agents stay connected between requests; liveness
//! comes from heartbeat staleness.

use super::server::{CredentialQuery, TransportState, process_body, reject};
use crate::agent::domain::TransportType;
use crate::opamp::proto::ServerToAgent;
use crate::opamp::{Disposition, ProcessingError};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use prost::Message;
use tracing::warn;

/// Content type of OpAMP HTTP bodies.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

pub(super) async fn exchange(
    State(state): State<TransportState>,
    Query(query): Query<CredentialQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let principal = match state.authenticate(&headers, &query).await {
        Ok(principal) => principal,
        Err(err) => return reject(&err),
    };
    let session = match state
        .handler
        .open_session(principal.clone(), TransportType::HttpPoll)
        .await
    {
        Ok(session) => session,
        Err(err) => {
            warn!(instance_uid = %principal.instance_uid, error = %err, "poll refused");
            let status = refusal_status(&err);
            return protobuf(status, &err.to_response(principal.instance_uid.to_wire()));
        }
    };

    let reply = process_body(state.handler.as_ref(), &session, &body).await;
    let status = match reply.disposition {
        Disposition::Respond => StatusCode::OK,
        Disposition::Close => StatusCode::SERVICE_UNAVAILABLE,
    };
    protobuf(status, &reply.response)
}

const fn refusal_status(err: &ProcessingError) -> StatusCode {
    match err {
        ProcessingError::UnknownAgent { .. } => StatusCode::FORBIDDEN,
        _ if err.is_store_failure() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn protobuf(status: StatusCode, message: &ServerToAgent) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)],
        message.encode_to_vec(),
    )
        .into_response()
}
