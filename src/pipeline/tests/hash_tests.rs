//! Tests for content hashing and agent-reported hash parsing.

use crate::pipeline::domain::{ConfigHash, ParseConfigHashError};
use proptest::prelude::*;
use rstest::rstest;

#[rstest]
fn hash_of_empty_input_matches_known_digest() {
    assert_eq!(
        ConfigHash::of(b"").to_string(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[rstest]
fn hash_is_computed_over_exact_bytes() {
    let compact = ConfigHash::of(b"receivers: {otlp: {}}");
    let spaced = ConfigHash::of(b"receivers:  {otlp: {}}");
    assert_ne!(compact, spaced);
}

#[rstest]
fn wire_hash_accepts_raw_digest() {
    let hash = ConfigHash::of(b"exporters: {}");
    assert_eq!(ConfigHash::from_wire(hash.as_bytes()), Ok(hash));
}

#[rstest]
#[case::lowercase(false)]
#[case::uppercase(true)]
fn wire_hash_accepts_hex_rendering(#[case] uppercase: bool) {
    let hash = ConfigHash::of(b"exporters: {}");
    let rendered = if uppercase {
        hash.to_string().to_uppercase()
    } else {
        hash.to_string()
    };
    assert_eq!(ConfigHash::from_wire(rendered.as_bytes()), Ok(hash));
}

#[rstest]
#[case::too_short(b"abc".as_slice())]
#[case::bad_digit(&[b'g'; 64])]
#[case::empty(b"".as_slice())]
fn wire_hash_rejects_other_shapes(#[case] bytes: &[u8]) {
    assert!(matches!(
        ConfigHash::from_wire(bytes),
        Err(ParseConfigHashError(_))
    ));
}

#[rstest]
fn hash_serialises_as_hex_string() {
    let hash = ConfigHash::of(b"service: {}");
    let json = serde_json::to_string(&hash).expect("hash should serialise");
    assert_eq!(json, format!("\"{hash}\""));
    let back: ConfigHash = serde_json::from_str(&json).expect("hash should deserialise");
    assert_eq!(back, hash);
}

proptest! {
    #[test]
    fn identical_bytes_hash_identically(content in proptest::collection::vec(any::<u8>(), 0..512)) {
        prop_assert_eq!(ConfigHash::of(&content), ConfigHash::of(&content.clone()));
    }

    #[test]
    fn single_byte_change_changes_hash(
        content in proptest::collection::vec(any::<u8>(), 1..512),
        position in any::<prop::sample::Index>(),
        delta in 1_u8..=255,
    ) {
        let mut altered = content.clone();
        let index = position.index(altered.len());
        if let Some(byte) = altered.get_mut(index) {
            *byte = byte.wrapping_add(delta);
        }
        prop_assert_ne!(ConfigHash::of(&content), ConfigHash::of(&altered));
    }
}
