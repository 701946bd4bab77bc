//! Tests for how processing errors are answered.

use crate::agent::domain::{AgentId, InstanceUid, OrgId};
use crate::agent::ports::AgentRepositoryError;
use crate::agent::services::AgentDirectoryError;
use crate::opamp::codec::DecodeFailure;
use crate::opamp::error::{Disposition, ProcessingError, RETRY_AFTER};
use crate::opamp::proto::{ServerErrorResponseType, server_error_response};
use rstest::rstest;

fn uid() -> InstanceUid {
    InstanceUid::new("collector-1").expect("valid uid")
}

fn store_outage() -> ProcessingError {
    ProcessingError::Directory(AgentDirectoryError::Repository(
        AgentRepositoryError::persistence(std::io::Error::other("connection reset")),
    ))
}

#[rstest]
#[case::unknown_agent(
    ProcessingError::UnknownAgent { org_id: OrgId::new(), instance_uid: uid() },
    Disposition::Close
)]
#[case::store_outage(store_outage(), Disposition::Close)]
#[case::missing_row(
    ProcessingError::Directory(AgentRepositoryError::NotFound(AgentId::new()).into()),
    Disposition::Respond
)]
#[case::identity(
    ProcessingError::IdentityMismatch { expected: uid(), reported: "other".to_owned() },
    Disposition::Respond
)]
#[case::uid_request(ProcessingError::InstanceUidRequested, Disposition::Respond)]
#[case::undecodable(
    ProcessingError::Undecodable(DecodeFailure { reason: "truncated".to_owned() }),
    Disposition::Respond
)]
fn dispositions_follow_the_error_kind(
    #[case] error: ProcessingError,
    #[case] expected: Disposition,
) {
    assert_eq!(error.disposition(), expected);
}

#[rstest]
fn client_errors_are_bad_requests() {
    let error = ProcessingError::InstanceUidRequested;

    let response = error.to_response(b"collector-1".to_vec());
    let detail = response.error_response.expect("error response is set");

    assert_eq!(response.instance_uid, b"collector-1");
    assert_eq!(detail.r#type, i32::from(ServerErrorResponseType::BadRequest));
    assert_eq!(detail.error_message, error.to_string());
    assert!(detail.details.is_none());
}

#[rstest]
fn store_outages_ask_for_a_retry() {
    let response = store_outage().to_response(Vec::new());
    let detail = response.error_response.expect("error response is set");

    assert_eq!(detail.r#type, i32::from(ServerErrorResponseType::Unavailable));
    match detail.details {
        Some(server_error_response::Details::RetryInfo(retry)) => assert_eq!(
            u128::from(retry.retry_after_nanoseconds),
            RETRY_AFTER.as_nanos()
        ),
        None => panic!("retry advice is attached"),
    }
}
