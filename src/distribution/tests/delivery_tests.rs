//! Tests for the shared delivery state machine and offer validation.

use crate::agent::domain::OrgId;
use crate::distribution::domain::{
    ConnectionSettingsOffer, Delivery, DeliveryReport, DistributionDomainError, PackageName,
    PackageStatus, SettingsStatus,
};
use crate::pipeline::domain::ConfigHash;
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::collections::BTreeMap;

#[fixture]
fn offered() -> (Delivery<PackageStatus>, ConfigHash) {
    let hash = ConfigHash::of(b"otelcol-contrib 0.110.0");
    let mut delivery = Delivery::idle(&DefaultClock);
    assert!(delivery.offer(hash, &DefaultClock));
    (delivery, hash)
}

#[rstest]
fn offering_moves_idle_to_in_flight(offered: (Delivery<PackageStatus>, ConfigHash)) {
    let (delivery, hash) = offered;

    assert_eq!(delivery.status(), PackageStatus::Installing);
    assert_eq!(delivery.hash(), Some(hash));
}

#[rstest]
fn same_offer_is_not_resent_even_after_failure(
    offered: (Delivery<PackageStatus>, ConfigHash),
) {
    let (mut delivery, hash) = offered;
    delivery.record_report(
        PackageStatus::Failed,
        Some(hash),
        Some("checksum mismatch".to_owned()),
        &DefaultClock,
    );

    assert!(!delivery.offer(hash, &DefaultClock));
    assert!(delivery.offer(ConfigHash::of(b"otelcol-contrib 0.111.0"), &DefaultClock));
    assert_eq!(delivery.status(), PackageStatus::Installing);
    assert_eq!(delivery.message(), None);
}

#[rstest]
fn installed_never_regresses(offered: (Delivery<PackageStatus>, ConfigHash)) {
    let (mut delivery, hash) = offered;
    let installed = delivery.record_report(PackageStatus::Installed, Some(hash), None, &DefaultClock);
    let late = delivery.record_report(PackageStatus::Installing, Some(hash), None, &DefaultClock);
    let repeat = delivery.record_report(PackageStatus::Installed, Some(hash), None, &DefaultClock);

    assert_eq!(
        installed,
        DeliveryReport::Changed {
            from: PackageStatus::Installing
        }
    );
    assert_eq!(late, DeliveryReport::Ignored);
    assert_eq!(repeat, DeliveryReport::Unchanged);
    assert_eq!(delivery.status(), PackageStatus::Installed);
}

#[rstest]
#[case(PackageStatus::Uninstalled)]
#[case(PackageStatus::Installed)]
fn reports_about_other_offers_are_ignored(
    offered: (Delivery<PackageStatus>, ConfigHash),
    #[case] reported: PackageStatus,
) {
    let (mut delivery, _) = offered;

    let outcome = delivery.record_report(
        reported,
        Some(ConfigHash::of(b"something else")),
        None,
        &DefaultClock,
    );

    assert_eq!(outcome, DeliveryReport::Ignored);
    assert_eq!(delivery.status(), PackageStatus::Installing);
}

#[rstest]
fn failed_delivery_can_still_succeed(offered: (Delivery<PackageStatus>, ConfigHash)) {
    let (mut delivery, hash) = offered;
    delivery.record_report(PackageStatus::Failed, Some(hash), None, &DefaultClock);

    let retried = delivery.record_report(PackageStatus::Installed, None, None, &DefaultClock);

    assert_eq!(
        retried,
        DeliveryReport::Changed {
            from: PackageStatus::Failed
        }
    );
}

#[rstest]
fn settings_ledger_uses_the_same_shape() {
    let hash = ConfigHash::of(b"settings");
    let mut delivery: Delivery<SettingsStatus> = Delivery::idle(&DefaultClock);
    assert_eq!(delivery.status(), SettingsStatus::Unset);

    delivery.offer(hash, &DefaultClock);
    let outcome = delivery.record_report(SettingsStatus::Applied, Some(hash), None, &DefaultClock);

    assert_eq!(
        outcome,
        DeliveryReport::Changed {
            from: SettingsStatus::Applying
        }
    );
}

#[rstest]
#[case("", DistributionDomainError::EmptyPackageName)]
#[case("   ", DistributionDomainError::EmptyPackageName)]
fn blank_package_names_are_rejected(#[case] raw: &str, #[case] expected: DistributionDomainError) {
    assert_eq!(PackageName::new(raw), Err(expected));
}

#[rstest]
fn overlong_package_names_are_rejected() {
    let result = PackageName::new("p".repeat(129));

    assert!(matches!(
        result,
        Err(DistributionDomainError::PackageNameTooLong { max: 128, .. })
    ));
}

#[rstest]
fn settings_hash_tracks_content() {
    let org_id = OrgId::new();
    let headers = BTreeMap::from([("x-tenant".to_owned(), "edge".to_owned())]);
    let first = ConnectionSettingsOffer::new(org_id, None, 30, headers.clone())
        .expect("valid settings");
    let same = ConnectionSettingsOffer::new(org_id, Some("  ".to_owned()), 30, headers)
        .expect("valid settings");
    let slower = ConnectionSettingsOffer::new(org_id, None, 60, BTreeMap::new())
        .expect("valid settings");

    assert_eq!(first.hash(), same.hash());
    assert_eq!(same.endpoint(), None);
    assert_ne!(first.hash(), slower.hash());
    assert_eq!(
        ConnectionSettingsOffer::new(org_id, None, 0, BTreeMap::new()),
        Err(DistributionDomainError::InvalidHeartbeatInterval)
    );
}
