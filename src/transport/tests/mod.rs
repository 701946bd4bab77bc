//! Unit tests for authentication, channel tracking, and the HTTP fallback.

mod auth_tests;
mod websocket_tests;

use crate::agent::domain::{InstanceUid, OrgId};
use crate::opamp::Principal;

fn principal(org_id: OrgId, uid: &str) -> Principal {
    Principal {
        org_id,
        instance_uid: InstanceUid::new(uid).expect("valid uid"),
    }
}
