//! Round-trip and name-table tests for agent and server capabilities.

use crate::capability::{
    AgentCapabilities, CAPABILITY_TABLE_VERSION, ServerCapabilities, UnknownCapabilityName,
};
use proptest::prelude::*;
use rstest::rstest;

proptest! {
    #[test]
    fn agent_capabilities_round_trip_any_bits(raw in any::<u64>()) {
        let decoded = AgentCapabilities::decode(raw);
        prop_assert_eq!(decoded.encode(), raw);
        prop_assert_eq!(AgentCapabilities::decode(decoded.encode()), decoded);
    }

    #[test]
    fn server_capabilities_round_trip_any_bits(raw in any::<u64>()) {
        let decoded = ServerCapabilities::decode(raw);
        prop_assert_eq!(decoded.encode(), raw);
        prop_assert_eq!(ServerCapabilities::decode(decoded.encode()), decoded);
    }
}

#[rstest]
fn unknown_agent_bits_are_retained_and_reported() {
    let raw = AgentCapabilities::ACCEPTS_REMOTE_CONFIG.bits() | (1 << 40);
    let caps = AgentCapabilities::decode(raw);

    assert!(caps.contains(AgentCapabilities::ACCEPTS_REMOTE_CONFIG));
    assert_eq!(caps.unknown_bits(), 1 << 40);
    assert_eq!(caps.names(), vec!["AcceptsRemoteConfig"]);

    let report = caps.report();
    assert_eq!(report.raw(), raw);
    assert_eq!(report.unknown_bits(), 1 << 40);
    assert_eq!(report.table_version(), CAPABILITY_TABLE_VERSION);
}

#[rstest]
fn agent_name_table_covers_sixteen_bits() {
    assert_eq!(AgentCapabilities::all_named().names().len(), 16);
    assert_eq!(AgentCapabilities::all_named().unknown_bits(), 0);
}

#[rstest]
fn server_name_table_covers_seven_bits() {
    assert_eq!(ServerCapabilities::all_named().names().len(), 7);
    assert_eq!(ServerCapabilities::all_named().unknown_bits(), 0);
}

#[rstest]
fn supported_server_set_excludes_connection_settings_requests() {
    assert!(
        !ServerCapabilities::SUPPORTED
            .contains(ServerCapabilities::ACCEPTS_CONNECTION_SETTINGS_REQUEST)
    );
    assert!(ServerCapabilities::SUPPORTED.contains(ServerCapabilities::OFFERS_REMOTE_CONFIG));
    assert_eq!(ServerCapabilities::default(), ServerCapabilities::SUPPORTED);
}

#[rstest]
#[case(&["ReportsStatus", "AcceptsRemoteConfig"], 0x3)]
#[case(&[" reportseffectiveconfig "], 0x4)]
#[case(&[], 0x0)]
fn agent_capabilities_parse_from_names(#[case] names: &[&str], #[case] expected: u64) {
    let parsed =
        AgentCapabilities::from_names(names.iter().copied()).expect("names should parse");
    assert_eq!(parsed.encode(), expected);
}

#[rstest]
fn unknown_capability_name_is_rejected() {
    let result = ServerCapabilities::from_names(["OffersTelepathy"]);
    assert_eq!(
        result,
        Err(UnknownCapabilityName("OffersTelepathy".to_owned()))
    );
}
