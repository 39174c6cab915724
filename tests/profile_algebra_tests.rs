//! Profile algebra exercised through the full pipeline: fixtures encoded to
//! bytes, decoded, assembled into pods, then merged/intersected/subtracted.

mod common;

use common::{counter_file_with, fixture_counters, fixture_meta};
use covpods::{
    build_pod, decode_counter_bytes, decode_meta_bytes, encode_counter_bytes, encode_meta_bytes,
    intersect_profiles, merge_profiles, subtract_profiles, CounterMode, CoverageError,
    FunctionCounters, PkgFuncKey, Profile,
};
use pretty_assertions::assert_eq;

fn profile_from_bytes(mode: CounterMode, counts_for_f: Vec<u64>) -> Profile {
    let meta = fixture_meta(mode);
    let meta_bytes = encode_meta_bytes(&meta);
    let meta = decode_meta_bytes(&meta_bytes, &meta.file_path).unwrap();

    let cf = fixture_counters(counts_for_f);
    let cf_bytes = encode_counter_bytes(&cf);
    let cf = decode_counter_bytes(&cf_bytes, &cf.file_path).unwrap();

    build_pod(meta, &[cf]).profile
}

fn key_f() -> PkgFuncKey {
    PkgFuncKey::new("pkg/a", "F")
}

#[test]
fn count_mode_merge_scenario() {
    let a = profile_from_bytes(CounterMode::Count, vec![1, 0]);
    let b = profile_from_bytes(CounterMode::Count, vec![0, 1]);
    let merged = merge_profiles(&[a, b]).unwrap();
    assert_eq!(merged.counters[&key_f()], vec![1, 1]);
}

#[test]
fn count_mode_merge_adds_and_set_mode_ors() {
    let a = profile_from_bytes(CounterMode::Count, vec![2, 3]);
    let b = profile_from_bytes(CounterMode::Count, vec![1, 1]);
    assert_eq!(
        merge_profiles(&[a, b]).unwrap().counters[&key_f()],
        vec![3, 4]
    );

    let a = profile_from_bytes(CounterMode::Set, vec![2, 3]);
    let b = profile_from_bytes(CounterMode::Set, vec![1, 1]);
    assert_eq!(
        merge_profiles(&[a, b]).unwrap().counters[&key_f()],
        vec![1, 1]
    );
}

#[test]
fn merge_is_associative_in_both_modes() {
    for mode in [CounterMode::Set, CounterMode::Count] {
        let a = profile_from_bytes(mode, vec![1, 0]);
        let b = profile_from_bytes(mode, vec![2, 5]);
        let c = profile_from_bytes(mode, vec![0, 7]);

        let left = merge_profiles(&[
            merge_profiles(&[a.clone(), b.clone()]).unwrap(),
            c.clone(),
        ])
        .unwrap();
        let right = merge_profiles(&[a, merge_profiles(&[b, c]).unwrap()]).unwrap();
        assert_eq!(left.counters, right.counters, "mode {mode:?}");
    }
}

#[test]
fn merge_single_operand_is_identity() {
    let p = profile_from_bytes(CounterMode::Count, vec![4, 9]);
    let merged = merge_profiles(std::slice::from_ref(&p)).unwrap();
    assert_eq!(merged, p);
}

#[test]
fn intersect_self_is_idempotent_modulo_sparsity() {
    let p = profile_from_bytes(CounterMode::Count, vec![6, 0]);
    let out = intersect_profiles(&[p.clone(), p]).unwrap();
    assert_eq!(out.counters[&key_f()], vec![6, 0]);
    // G and H never executed, so they stay absent.
    assert_eq!(out.counters.len(), 1);
}

#[test]
fn intersect_drops_keys_missing_from_any_operand() {
    let a = profile_from_bytes(CounterMode::Count, vec![1, 1]);
    // b covers G instead of F.
    let meta = fixture_meta(CounterMode::Count);
    let b = build_pod(
        meta,
        &[counter_file_with(vec![FunctionCounters {
            package_index: 0,
            function_index: 1,
            counts: vec![3],
        }])],
    )
    .profile;

    let out = intersect_profiles(&[a, b]).unwrap();
    assert!(out.counters.is_empty());
}

#[test]
fn subtract_self_annihilates() {
    let p = profile_from_bytes(CounterMode::Count, vec![2, 8]);
    let out = subtract_profiles(&p, &p).unwrap();
    assert!(out.counters.is_empty());
}

#[test]
fn subtract_keeps_only_unseen_positions() {
    let a = profile_from_bytes(CounterMode::Count, vec![2, 8]);
    let b = profile_from_bytes(CounterMode::Count, vec![5, 0]);
    let out = subtract_profiles(&a, &b).unwrap();
    assert_eq!(out.counters[&key_f()], vec![0, 8]);
}

#[test]
fn differing_hashes_fail_with_incompatible_profiles() {
    let a = profile_from_bytes(CounterMode::Count, vec![1, 1]);
    let mut b = profile_from_bytes(CounterMode::Count, vec![1, 1]);
    b.meta.file_hash = [0x99; 16];

    for result in [
        merge_profiles(&[a.clone(), b.clone()]),
        intersect_profiles(&[a.clone(), b.clone()]),
        subtract_profiles(&a, &b),
    ] {
        assert!(matches!(
            result.unwrap_err(),
            CoverageError::IncompatibleProfiles { .. }
        ));
    }
}
