//! End-to-end codec tests: encode fixtures to real bytes, decode them back,
//! and check the decoded structure matches what built the fixture.

mod common;

use common::{fixture_counters, fixture_meta, FIXTURE_HASH};
use covpods::{
    decode_counter_bytes, decode_meta_bytes, encode_counter_bytes, encode_meta_bytes, CounterMode,
    CoverageError,
};
use pretty_assertions::assert_eq;
use std::path::Path;

#[test]
fn meta_round_trip_preserves_structure_counts() {
    let meta = fixture_meta(CounterMode::Count);
    let bytes = encode_meta_bytes(&meta);
    let decoded = decode_meta_bytes(&bytes, &meta.file_path).unwrap();

    assert_eq!(decoded.packages.len(), 2);
    assert_eq!(decoded.packages[0].functions.len(), 2);
    assert_eq!(decoded.packages[0].functions[0].units.len(), 2);
    assert_eq!(decoded.packages[0].functions[1].units.len(), 1);
    assert_eq!(decoded.packages[1].functions.len(), 1);
    assert_eq!(decoded.packages[1].functions[0].units.len(), 3);
    assert_eq!(decoded, meta);
}

#[test]
fn meta_hash_is_trusted_from_header() {
    let mut meta = fixture_meta(CounterMode::Set);
    meta.file_hash = [0x42; 16];
    let bytes = encode_meta_bytes(&meta);
    let decoded = decode_meta_bytes(&bytes, &meta.file_path).unwrap();
    assert_eq!(decoded.file_hash, [0x42; 16]);
}

#[test]
fn counter_round_trip_preserves_records() {
    let cf = fixture_counters(vec![1, 5]);
    let bytes = encode_counter_bytes(&cf);
    let decoded = decode_counter_bytes(&bytes, &cf.file_path).unwrap();

    assert_eq!(decoded.meta_file_hash, FIXTURE_HASH);
    assert_eq!(decoded.segments.len(), 1);
    assert_eq!(decoded.segments[0].functions.len(), 1);
    assert_eq!(decoded.segments[0].functions[0].counts, vec![1, 5]);
    assert_eq!(decoded.goos, "linux");
    assert_eq!(decoded.goarch, "amd64");
}

#[test]
fn truncation_at_every_boundary_is_a_data_error() {
    let meta_bytes = encode_meta_bytes(&fixture_meta(CounterMode::Count));
    for cut in 0..meta_bytes.len() {
        let err = decode_meta_bytes(&meta_bytes[..cut], Path::new("x")).unwrap_err();
        assert!(err.is_data_error(), "meta cut at {cut}: {err}");
    }

    let counter_bytes = encode_counter_bytes(&fixture_counters(vec![1, 0]));
    for cut in 0..counter_bytes.len() {
        let err = decode_counter_bytes(&counter_bytes[..cut], Path::new("x")).unwrap_err();
        assert!(err.is_data_error(), "counter cut at {cut}: {err}");
    }
}

#[test]
fn counter_footer_disagreement_is_integrity_error() {
    let mut bytes = encode_counter_bytes(&fixture_counters(vec![2, 2]));
    let count_pos = bytes.len() - 4;
    bytes[count_pos] = bytes[count_pos].wrapping_add(1);
    let err = decode_counter_bytes(&bytes, Path::new("x")).unwrap_err();
    assert!(matches!(err, CoverageError::Integrity { .. }));
}

#[test]
fn garbage_input_is_rejected_without_panicking() {
    let garbage: Vec<u8> = (0..512u32).map(|i| (i * 7 + 13) as u8).collect();
    assert!(decode_meta_bytes(&garbage, Path::new("x")).is_err());
    assert!(decode_counter_bytes(&garbage, Path::new("x")).is_err());
    assert!(decode_meta_bytes(&[], Path::new("x")).is_err());
    assert!(decode_counter_bytes(&[], Path::new("x")).is_err());
}
